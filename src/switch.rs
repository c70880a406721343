use std::collections::BTreeMap;
use std::mem;

use log::{info, warn};
use page_table::PageTableEntry;

use crate::{process::Process, Context, Pfn, Pid, VmError, Vpn};

/// What [`Context::request_process`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switched {
    /// The process was taken off the ready queue.
    Resumed(Pid),
    /// The process was not waiting and was forked from the previous one.
    Forked(Pid),
}

impl<const PTES_PER_PAGE: usize, const NR_FRAMES: usize> Context<PTES_PER_PAGE, NR_FRAMES> {
    /// Makes `pid` the running process.
    ///
    /// The TLB is flushed first, whatever the outcome. If `pid` waits in the
    /// ready queue it is resumed. Otherwise it is forked from the current
    /// process, sharing every mapped frame with it; pages mapped for writing
    /// become write-protected in both processes. The running pid is never in
    /// the ready queue, so requesting it forks a second process with that pid.
    /// Either way the previous process goes to the tail of the ready queue.
    pub fn request_process(&mut self, pid: Pid) -> Result<Switched, VmError> {
        self.tlb.flush();

        let waiting = self
            .ready_queue
            .iter()
            .position(|p| p.pid == pid)
            .and_then(|index| self.ready_queue.remove(index));

        match waiting {
            Some(next) => {
                self.install(next);
                Ok(Switched::Resumed(pid))
            }
            None => {
                self.fork(pid)?;
                Ok(Switched::Forked(pid))
            }
        }
    }

    fn fork(&mut self, pid: Pid) -> Result<(), VmError> {
        let entries: Vec<(Vpn, PageTableEntry)> = self
            .current
            .page_table
            .iter()
            .filter(|(_, pte)| pte.valid)
            .collect();
        if entries.is_empty() {
            warn!("pid {}: refusing to fork an empty address space", self.current.pid);
            return Err(VmError::EmptyAddressSpace);
        }

        let mut shares: BTreeMap<Pfn, u32> = BTreeMap::new();
        for pfn in entries.iter().filter_map(|(_, pte)| pte.pfn) {
            *shares.entry(pfn).or_insert(0) += 1;
        }
        for (&pfn, &extra) in shares.iter() {
            if !self.frames.can_share(pfn, extra)? {
                warn!("frame {} cannot be shared any further", pfn);
                return Err(VmError::OutOfMemory);
            }
        }

        let mut child = Process::new(pid);
        for (vpn, mut pte) in entries {
            self.entry_mut(vpn)?.write_protect();
            pte.write_protect();
            *child
                .page_table
                .entry_or_insert(vpn)
                .map_err(|err| VmError::from_page_table(err, vpn))? = pte;
            if let Some(pfn) = pte.pfn {
                self.frames.get(pfn)?;
            }
        }

        info!(
            "forked pid {} from pid {} ({} pages shared)",
            pid,
            self.current.pid,
            child.page_table.valid_entries()
        );
        self.install(child);
        Ok(())
    }

    fn install(&mut self, next: Process<PTES_PER_PAGE>) {
        let prev = mem::replace(&mut self.current, next);
        info!("switch: pid {} -> pid {}", prev.pid, self.current.pid);
        self.ready_queue.push_back(prev);
    }
}
