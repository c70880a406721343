use std::collections::VecDeque;

use log::{debug, trace};
use memory::FrameTable;
use page_table::{PageTable, PageTableEntry};
use tlb::Tlb;

use crate::{process::Process, Pfn, Pid, VmError, Vpn};

/// Everything the MMU model works on: the running process, the ready queue,
/// the TLB and the frame table.
///
/// The page table base register always refers to the page table of the
/// `current` process, see [`Context::ptbr`].
#[derive(Debug)]
pub struct Context<const PTES_PER_PAGE: usize, const NR_FRAMES: usize> {
    pub(crate) ready_queue: VecDeque<Process<PTES_PER_PAGE>>,
    pub(crate) current: Process<PTES_PER_PAGE>,
    pub(crate) tlb: Tlb,
    pub(crate) frames: FrameTable<NR_FRAMES>,
}

impl<const PTES_PER_PAGE: usize, const NR_FRAMES: usize> Context<PTES_PER_PAGE, NR_FRAMES> {
    /// A system running process 0 with an empty address space.
    pub fn init() -> Self {
        Self::with_initial_pid(0)
    }

    pub fn with_initial_pid(pid: Pid) -> Self {
        debug!(
            "initializing context: {} ptes per page, {} frames",
            PTES_PER_PAGE, NR_FRAMES
        );
        Self {
            ready_queue: VecDeque::new(),
            current: Process::new(pid),
            tlb: Tlb::init(PTES_PER_PAGE * PTES_PER_PAGE),
            frames: FrameTable::init(),
        }
    }

    pub fn current_pid(&self) -> Pid {
        self.current.pid
    }

    /// Pids in the ready queue, head first.
    pub fn ready_pids(&self) -> Vec<Pid> {
        self.ready_queue.iter().map(|p| p.pid).collect()
    }

    /// The page table the MMU walks.
    pub fn ptbr(&self) -> &PageTable<PTES_PER_PAGE> {
        &self.current.page_table
    }

    pub fn tlb(&self) -> &Tlb {
        &self.tlb
    }

    pub fn frames(&self) -> &FrameTable<NR_FRAMES> {
        &self.frames
    }

    /// The running process followed by the ready queue.
    pub fn processes(&self) -> impl Iterator<Item = &Process<PTES_PER_PAGE>> {
        std::iter::once(&self.current).chain(self.ready_queue.iter())
    }

    pub fn mapcount(&self, pfn: Pfn) -> Result<u32, VmError> {
        Ok(self.frames.mapcount(pfn)?)
    }

    /// The current process's entry for `vpn`, `None` if its region is unmapped.
    pub fn entry(&self, vpn: Vpn) -> Result<Option<PageTableEntry>, VmError> {
        self.current
            .page_table
            .entry(vpn)
            .map(|pte| pte.copied())
            .map_err(|err| VmError::from_page_table(err, vpn))
    }

    pub(crate) fn entry_mut(&mut self, vpn: Vpn) -> Result<&mut PageTableEntry, VmError> {
        self.current
            .page_table
            .entry_mut(vpn)
            .map_err(|err| VmError::from_page_table(err, vpn))?
            .ok_or(VmError::NotMapped(vpn))
    }

    pub fn lookup_translation(&self, vpn: Vpn) -> Option<Pfn> {
        self.tlb.lookup(vpn)
    }

    pub fn insert_translation(&mut self, vpn: Vpn, pfn: Pfn) {
        self.tlb.insert(vpn, pfn);
    }

    pub fn invalidate_translation(&mut self, vpn: Vpn) {
        self.tlb.invalidate(vpn);
    }

    pub fn flush_translations(&mut self) {
        self.tlb.flush();
    }

    /// Verifies that every frame's mapcount equals the number of page table
    /// entries, over all processes, that hold it.
    pub fn check_mapcounts(&self) -> Result<(), VmError> {
        let mut expected = vec![0u32; NR_FRAMES];
        for process in self.processes() {
            for (_, pte) in process.page_table.iter() {
                if let Some(pfn) = pte.pfn {
                    match expected.get_mut(pfn as usize) {
                        Some(count) => *count += 1,
                        None => return Err(memory::MemoryError::OverCapacity.into()),
                    }
                }
            }
        }
        for (pfn, expected) in expected.into_iter().enumerate() {
            let pfn = pfn as Pfn;
            let actual = self.frames.mapcount(pfn)?;
            if actual != expected {
                return Err(VmError::MapcountMismatch {
                    pfn,
                    expected,
                    actual,
                });
            }
        }
        trace!("mapcounts consistent");
        Ok(())
    }
}

impl<const PTES_PER_PAGE: usize, const NR_FRAMES: usize> Default
    for Context<PTES_PER_PAGE, NR_FRAMES>
{
    fn default() -> Self {
        Self::init()
    }
}
