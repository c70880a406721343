use log::info;
use page_table::{Access, PageTableEntry};

use crate::{Context, Pfn, VmError, Vpn};

impl<const PTES_PER_PAGE: usize, const NR_FRAMES: usize> Context<PTES_PER_PAGE, NR_FRAMES> {
    /// Maps the lowest free frame at `vpn` of the current process.
    ///
    /// The page directory covering `vpn` is created first if it is missing.
    /// Pages allocated for [`Access::Read`] are private and read-only, pages
    /// allocated for [`Access::Write`] are writable and may be shared
    /// copy-on-write after a fork.
    pub fn allocate(&mut self, vpn: Vpn, access: Access) -> Result<Pfn, VmError> {
        let pte = self
            .current
            .page_table
            .entry_or_insert(vpn)
            .map_err(|err| VmError::from_page_table(err, vpn))?;
        if pte.holds_frame() {
            return Err(VmError::AlreadyMapped(vpn));
        }
        self.map_fresh_frame(vpn, access)
    }

    /// Unmaps `vpn` from the current process and drops its frame reference.
    pub fn deallocate(&mut self, vpn: Vpn) -> Result<(), VmError> {
        let pte = self.entry_mut(vpn)?;
        let pfn = match pte.pfn {
            Some(pfn) if pte.valid => pfn,
            _ => return Err(VmError::NotMapped(vpn)),
        };
        self.frames.put(pfn)?;
        self.entry_mut(vpn)?.clear();
        self.tlb.invalidate(vpn);
        info!("pid {}: freed vpn {} (frame {})", self.current.pid, vpn, pfn);
        Ok(())
    }

    /// Points `vpn` at the lowest free frame, overwriting the entry.
    ///
    /// Whatever frame the entry held before must already have been released.
    pub(crate) fn map_fresh_frame(&mut self, vpn: Vpn, access: Access) -> Result<Pfn, VmError> {
        let pfn = self.frames.allocate_frame()?;
        match self.current.page_table.entry_or_insert(vpn) {
            Ok(pte) => *pte = PageTableEntry::map(pfn, access),
            Err(err) => {
                self.frames.put(pfn)?;
                return Err(VmError::from_page_table(err, vpn));
            }
        }
        info!(
            "pid {}: vpn {} -> frame {} ({:?})",
            self.current.pid, vpn, pfn, access
        );
        Ok(pfn)
    }

    pub(crate) fn has_free_frame(&self) -> bool {
        self.frames.lowest_free().is_some()
    }
}
