use log::{debug, info, warn};
use page_table::{Access, AccessRights, PageTableEntry};

use crate::{Context, FaultCause, VmError, Vpn};

impl<const PTES_PER_PAGE: usize, const NR_FRAMES: usize> Context<PTES_PER_PAGE, NR_FRAMES> {
    /// Resolves a failed translation of `vpn` for `access`.
    ///
    /// The causes are checked in this order:
    /// 1. no directory covers `vpn`: the access is a violation;
    /// 2. the entry is invalid: it is re-validated in place when it still
    ///    names a frame that nobody else maps, otherwise it gets a new frame;
    /// 3. a write hit a write-protected shared page: the page becomes writable
    ///    in place if it is no longer shared, otherwise it is copied to a new
    ///    frame.
    ///
    /// Anything else is an access violation.
    pub fn handle_fault(&mut self, vpn: Vpn, access: Access) -> Result<(), VmError> {
        let pte = match self.entry(vpn)? {
            Some(pte) => pte,
            None => {
                warn!("pid {}: fault on unmapped region, vpn {}", self.current.pid, vpn);
                return Err(VmError::AccessViolation(FaultCause::UnmappedRegion));
            }
        };

        if !pte.valid {
            return self.fault_invalid_page(vpn, pte, access);
        }

        if access == Access::Write && pte.is_cow() {
            return self.fault_copy_on_write(vpn, pte);
        }

        let cause = if access == Access::Write
            && !pte.writable
            && pte.rights == Some(AccessRights::PrivateReadOnly)
        {
            FaultCause::WriteToReadOnly
        } else {
            FaultCause::NotAFault
        };
        warn!(
            "pid {}: unresolvable {:?} fault on vpn {}: {:?}",
            self.current.pid, access, vpn, cause
        );
        Err(VmError::AccessViolation(cause))
    }

    fn fault_invalid_page(
        &mut self,
        vpn: Vpn,
        pte: PageTableEntry,
        access: Access,
    ) -> Result<(), VmError> {
        if let Some(pfn) = pte.pfn {
            if self.frames.mapcount(pfn)? == 1 {
                self.entry_mut(vpn)?.valid = true;
                debug!("pid {}: revalidated vpn {} (frame {})", self.current.pid, vpn, pfn);
                return Ok(());
            }
        }

        if !self.has_free_frame() {
            return Err(VmError::OutOfMemory);
        }
        if let Some(stale) = pte.pfn {
            self.frames.put(stale)?;
        }
        self.map_fresh_frame(vpn, access)?;
        self.tlb.invalidate(vpn);
        Ok(())
    }

    fn fault_copy_on_write(&mut self, vpn: Vpn, pte: PageTableEntry) -> Result<(), VmError> {
        let shared = pte.pfn.ok_or(VmError::NotMapped(vpn))?;

        if self.frames.mapcount(shared)? == 1 {
            self.entry_mut(vpn)?.writable = true;
            debug!(
                "pid {}: vpn {} no longer shared, writable in place",
                self.current.pid, vpn
            );
            return Ok(());
        }

        if !self.has_free_frame() {
            return Err(VmError::OutOfMemory);
        }
        self.frames.put(shared)?;
        let pfn = self.map_fresh_frame(vpn, Access::Write)?;
        self.tlb.invalidate(vpn);
        info!(
            "pid {}: copy-on-write of vpn {}, frame {} -> {}",
            self.current.pid, vpn, shared, pfn
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use page_table::Access;

    use crate::{Context, FaultCause, VmError};

    #[test]
    fn fault_on_unmapped_region() {
        let mut ctx = Context::<4, 8>::init();
        assert_eq!(
            ctx.handle_fault(6, Access::Read),
            Err(VmError::AccessViolation(FaultCause::UnmappedRegion))
        );
    }

    #[test]
    fn fault_on_unmapped_page_allocates() {
        let mut ctx = Context::<4, 8>::init();
        ctx.allocate(4, Access::Read).unwrap();
        ctx.handle_fault(5, Access::Write).unwrap();
        let pte = ctx.entry(5).unwrap().unwrap();
        assert!(pte.valid);
        assert!(pte.writable);
        assert_eq!(pte.pfn, Some(1));
        assert_eq!(ctx.check_mapcounts(), Ok(()));
    }

    #[test]
    fn fault_on_freed_page_allocates_lowest_frame() {
        let mut ctx = Context::<4, 8>::init();
        ctx.allocate(0, Access::Write).unwrap();
        ctx.allocate(1, Access::Write).unwrap();
        ctx.deallocate(0).unwrap();
        ctx.handle_fault(0, Access::Read).unwrap();
        let pte = ctx.entry(0).unwrap().unwrap();
        assert_eq!(pte.pfn, Some(0));
        assert!(!pte.writable);
        assert_eq!(ctx.check_mapcounts(), Ok(()));
    }

    #[test]
    fn deferred_page_is_revalidated_in_place() {
        let mut ctx = Context::<4, 8>::init();
        let pfn = ctx.allocate(2, Access::Write).unwrap();
        ctx.current.page_table.entry_mut(2).unwrap().unwrap().valid = false;
        ctx.handle_fault(2, Access::Write).unwrap();
        let pte = ctx.entry(2).unwrap().unwrap();
        assert!(pte.valid);
        assert_eq!(pte.pfn, Some(pfn));
        assert_eq!(ctx.mapcount(pfn), Ok(1));
        assert_eq!(ctx.frames().free_frames(), 7);
    }

    #[test]
    fn shared_deferred_page_gets_new_frame() {
        let mut ctx = Context::<4, 8>::init();
        let pfn = ctx.allocate(2, Access::Write).unwrap();
        ctx.request_process(1).unwrap();
        ctx.current.page_table.entry_mut(2).unwrap().unwrap().valid = false;
        assert_eq!(ctx.mapcount(pfn), Ok(2));
        ctx.handle_fault(2, Access::Write).unwrap();
        let pte = ctx.entry(2).unwrap().unwrap();
        assert!(pte.valid);
        assert!(pte.writable);
        assert_eq!(pte.pfn, Some(1));
        assert_eq!(ctx.mapcount(pfn), Ok(1));
        assert_eq!(ctx.check_mapcounts(), Ok(()));
    }

    #[test]
    fn write_to_private_read_only_page() {
        let mut ctx = Context::<4, 8>::init();
        ctx.allocate(1, Access::Read).unwrap();
        assert_eq!(
            ctx.handle_fault(1, Access::Write),
            Err(VmError::AccessViolation(FaultCause::WriteToReadOnly))
        );
    }

    #[test]
    fn fault_on_writable_page_is_not_a_fault() {
        let mut ctx = Context::<4, 8>::init();
        ctx.allocate(1, Access::Write).unwrap();
        assert_eq!(
            ctx.handle_fault(1, Access::Write),
            Err(VmError::AccessViolation(FaultCause::NotAFault))
        );
        assert_eq!(
            ctx.handle_fault(1, Access::Read),
            Err(VmError::AccessViolation(FaultCause::NotAFault))
        );
    }

    #[test]
    fn copy_on_write_without_free_frame() {
        let mut ctx = Context::<4, 1>::init();
        ctx.allocate(0, Access::Write).unwrap();
        ctx.request_process(1).unwrap();
        assert_eq!(ctx.handle_fault(0, Access::Write), Err(VmError::OutOfMemory));
        let pte = ctx.entry(0).unwrap().unwrap();
        assert_eq!(pte.pfn, Some(0));
        assert!(!pte.writable);
        assert_eq!(ctx.mapcount(0), Ok(2));
        assert_eq!(ctx.check_mapcounts(), Ok(()));
    }

    #[test]
    fn copy_on_write_invalidates_stale_translation() {
        let mut ctx = Context::<4, 8>::init();
        ctx.allocate(3, Access::Write).unwrap();
        ctx.request_process(1).unwrap();
        ctx.insert_translation(3, 0);
        ctx.handle_fault(3, Access::Write).unwrap();
        assert_eq!(ctx.lookup_translation(3), None);
        assert_eq!(ctx.entry(3).unwrap().unwrap().pfn, Some(1));
    }
}
