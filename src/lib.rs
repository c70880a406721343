use std::fmt;

use memory::MemoryError;
use page_table::PageTableError;

pub mod allocator;
pub mod commands;
pub mod context;
pub mod fault;
pub mod meta_commands;
pub mod process;
pub mod repl;
pub mod switch;

pub use context::Context;
pub use memory::{Pfn, MAX_MAPCOUNT};
pub use page_table::{Access, AccessRights, PageTableEntry, Vpn};
pub use process::{Pid, Process};
pub use switch::Switched;

/// Why a fault could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultCause {
    /// No page directory covers the address.
    UnmappedRegion,
    /// Write to a page that was mapped read-only.
    WriteToReadOnly,
    /// The page is mapped with the requested permission already.
    NotAFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    OutOfMemory,
    AccessViolation(FaultCause),
    NotMapped(Vpn),
    AlreadyMapped(Vpn),
    OutOfRange(Vpn),
    EmptyAddressSpace,
    Memory(MemoryError),
    MapcountMismatch { pfn: Pfn, expected: u32, actual: u32 },
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::OutOfMemory => write!(f, "out of memory"),
            VmError::AccessViolation(cause) => write!(f, "access violation ({:?})", cause),
            VmError::NotMapped(vpn) => write!(f, "vpn {} is not mapped", vpn),
            VmError::AlreadyMapped(vpn) => write!(f, "vpn {} is already mapped", vpn),
            VmError::OutOfRange(vpn) => write!(f, "vpn {} is outside the address space", vpn),
            VmError::EmptyAddressSpace => write!(f, "cannot fork a process with no mappings"),
            VmError::Memory(err) => write!(f, "frame table: {}", err),
            VmError::MapcountMismatch {
                pfn,
                expected,
                actual,
            } => write!(
                f,
                "mapcount of frame {} is {} but {} entries map it",
                pfn, actual, expected
            ),
        }
    }
}

impl From<MemoryError> for VmError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::OutOfMemory | MemoryError::MapcountOverflow => VmError::OutOfMemory,
            other => VmError::Memory(other),
        }
    }
}

impl VmError {
    pub(crate) fn from_page_table(err: PageTableError, vpn: Vpn) -> Self {
        match err {
            PageTableError::OutOfRange => VmError::OutOfRange(vpn),
        }
    }
}
