use memory::Pfn;

/// Kind of memory access a translation or allocation is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// What the page was originally mapped for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessRights {
    /// Mapped read-only; a write to it is always a violation.
    PrivateReadOnly,
    /// Mapped read-write; may be write-protected while shared after a fork.
    SharedWritable,
}

impl From<Access> for AccessRights {
    fn from(access: Access) -> Self {
        match access {
            Access::Read => AccessRights::PrivateReadOnly,
            Access::Write => AccessRights::SharedWritable,
        }
    }
}

/// Maps a virtual page to a physical frame.
///
/// `pfn` is `None` once the entry has been cleared. An entry that is not
/// `valid` but still names a frame is a deferred mapping and keeps its
/// reference on that frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageTableEntry {
    pub valid: bool,
    pub writable: bool,
    pub pfn: Option<Pfn>,
    pub rights: Option<AccessRights>,
}

impl PageTableEntry {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn map(pfn: Pfn, access: Access) -> Self {
        PageTableEntry {
            valid: true,
            writable: access == Access::Write,
            pfn: Some(pfn),
            rights: Some(access.into()),
        }
    }

    pub fn clear(&mut self) {
        *self = Self::zero();
    }

    pub fn holds_frame(&self) -> bool {
        self.pfn.is_some()
    }

    /// Valid, shareable and currently write-protected.
    pub fn is_cow(&self) -> bool {
        self.valid && !self.writable && self.rights == Some(AccessRights::SharedWritable)
    }

    pub fn write_protect(&mut self) {
        if self.rights == Some(AccessRights::SharedWritable) {
            self.writable = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_read() {
        let pte = PageTableEntry::map(4, Access::Read);
        assert!(pte.valid);
        assert!(!pte.writable);
        assert_eq!(pte.pfn, Some(4));
        assert_eq!(pte.rights, Some(AccessRights::PrivateReadOnly));
    }

    #[test]
    fn test_map_write_and_protect() {
        let mut pte = PageTableEntry::map(4, Access::Write);
        assert!(pte.writable);
        assert!(!pte.is_cow());
        pte.write_protect();
        assert!(!pte.writable);
        assert!(pte.is_cow());
    }

    #[test]
    fn test_write_protect_private_page() {
        let mut pte = PageTableEntry::map(1, Access::Read);
        pte.write_protect();
        assert!(!pte.is_cow());
    }

    #[test]
    fn test_clear() {
        let mut pte = PageTableEntry::map(9, Access::Write);
        pte.clear();
        assert_eq!(pte, PageTableEntry::zero());
        assert!(!pte.holds_frame());
    }
}
