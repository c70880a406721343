mod iter;
mod page_table_entry;

use std::fmt;

pub use memory::Pfn;
pub use page_table_entry::{Access, AccessRights, PageTableEntry};

pub use self::iter::PageTableIterator;

pub type Vpn = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTableError {
    OutOfRange,
}

impl fmt::Display for PageTableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageTableError::OutOfRange => write!(f, "virtual page number out of range"),
        }
    }
}

/// Second level of the page table, covering `PTES_PER_PAGE` consecutive pages.
#[derive(Debug, Clone)]
pub struct PageDirectory<const PTES_PER_PAGE: usize> {
    ptes: [PageTableEntry; PTES_PER_PAGE],
}

impl<const PTES_PER_PAGE: usize> PageDirectory<PTES_PER_PAGE> {
    pub fn new() -> Self {
        Self {
            ptes: [PageTableEntry::zero(); PTES_PER_PAGE],
        }
    }

    pub fn get(&self, index: usize) -> Option<&PageTableEntry> {
        self.ptes.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut PageTableEntry> {
        self.ptes.get_mut(index)
    }
}

impl<const PTES_PER_PAGE: usize> Default for PageDirectory<PTES_PER_PAGE> {
    fn default() -> Self {
        Self::new()
    }
}

/// Two-level page table of a single process.
///
/// A vpn splits into an outer index (`vpn / PTES_PER_PAGE`) selecting a
/// directory and an inner index (`vpn % PTES_PER_PAGE`) selecting the entry.
/// Directories are only allocated once something is mapped in their region;
/// an absent directory means the whole region is unmapped.
#[derive(Debug, Clone)]
pub struct PageTable<const PTES_PER_PAGE: usize> {
    outer: Vec<Option<Box<PageDirectory<PTES_PER_PAGE>>>>,
}

impl<const PTES_PER_PAGE: usize> PageTable<PTES_PER_PAGE> {
    pub fn init() -> Self {
        let mut outer = Vec::with_capacity(PTES_PER_PAGE);
        for _ in 0..PTES_PER_PAGE {
            outer.push(None);
        }
        Self { outer }
    }

    /// Size of the virtual address space in pages.
    pub fn nr_pages() -> usize {
        PTES_PER_PAGE * PTES_PER_PAGE
    }

    pub fn split(vpn: Vpn) -> Result<(usize, usize), PageTableError> {
        let vpn = vpn as usize;
        if vpn >= Self::nr_pages() {
            return Err(PageTableError::OutOfRange);
        }
        Ok((vpn / PTES_PER_PAGE, vpn % PTES_PER_PAGE))
    }

    pub fn directory(&self, outer: usize) -> Option<&PageDirectory<PTES_PER_PAGE>> {
        self.outer.get(outer)?.as_deref()
    }

    pub fn has_directory(&self, vpn: Vpn) -> Result<bool, PageTableError> {
        let (outer, _) = Self::split(vpn)?;
        Ok(self.outer[outer].is_some())
    }

    /// Number of allocated directories.
    pub fn directories(&self) -> usize {
        self.outer.iter().filter(|d| d.is_some()).count()
    }

    /// The entry for `vpn`, or `None` when its region is unmapped.
    pub fn entry(&self, vpn: Vpn) -> Result<Option<&PageTableEntry>, PageTableError> {
        let (outer, inner) = Self::split(vpn)?;
        Ok(self.outer[outer]
            .as_deref()
            .and_then(|directory| directory.get(inner)))
    }

    pub fn entry_mut(&mut self, vpn: Vpn) -> Result<Option<&mut PageTableEntry>, PageTableError> {
        let (outer, inner) = Self::split(vpn)?;
        Ok(self.outer[outer]
            .as_deref_mut()
            .and_then(|directory| directory.get_mut(inner)))
    }

    /// The entry for `vpn`, allocating its directory first if needed.
    pub fn entry_or_insert(&mut self, vpn: Vpn) -> Result<&mut PageTableEntry, PageTableError> {
        let (outer, inner) = Self::split(vpn)?;
        let directory = self.outer[outer].get_or_insert_with(|| {
            log::debug!("allocating page directory {}", outer);
            Box::new(PageDirectory::new())
        });
        directory.get_mut(inner).ok_or(PageTableError::OutOfRange)
    }

    /// Entries holding a frame, valid or deferred.
    pub fn iter(&self) -> PageTableIterator {
        let mut entries = Vec::new();
        for (outer, directory) in self.outer.iter().enumerate() {
            let directory = match directory {
                Some(directory) => directory,
                None => continue,
            };
            for (inner, pte) in directory.ptes.iter().enumerate() {
                if pte.holds_frame() {
                    entries.push(((outer * PTES_PER_PAGE + inner) as Vpn, *pte));
                }
            }
        }
        PageTableIterator::new(entries)
    }

    pub fn valid_entries(&self) -> usize {
        self.iter().filter(|(_, pte)| pte.valid).count()
    }
}

impl<const PTES_PER_PAGE: usize> Default for PageTable<PTES_PER_PAGE> {
    fn default() -> Self {
        Self::init()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_mapping() {
        let mut table: PageTable<16> = PageTable::init();
        assert_eq!(table.entry(12), Ok(None));
        *table.entry_or_insert(12).unwrap() = PageTableEntry::map(43, Access::Write);
        *table.entry_or_insert(4).unwrap() = PageTableEntry::map(45, Access::Read);
        assert_eq!(table.directories(), 1);
        let entry = table.entry(12).unwrap().unwrap();
        assert_eq!(entry.pfn, Some(43));
        assert!(entry.writable);
        let entry = table.entry(4).unwrap().unwrap();
        assert_eq!(entry.pfn, Some(45));
        assert!(!entry.writable);
    }

    #[test]
    fn region_mapped_but_empty() {
        let mut table: PageTable<4> = PageTable::init();
        table.entry_or_insert(5).unwrap();
        assert_eq!(table.has_directory(4), Ok(true));
        assert_eq!(table.has_directory(0), Ok(false));
        let entry = table.entry(6).unwrap().unwrap();
        assert!(!entry.valid);
        assert_eq!(table.valid_entries(), 0);
    }

    #[test]
    fn split_vpn() {
        assert_eq!(PageTable::<16>::split(0), Ok((0, 0)));
        assert_eq!(PageTable::<16>::split(17), Ok((1, 1)));
        assert_eq!(PageTable::<16>::split(255), Ok((15, 15)));
        assert_eq!(PageTable::<16>::split(256), Err(PageTableError::OutOfRange));
    }

    #[test]
    fn iterate_in_vpn_order() {
        let mut table: PageTable<4> = PageTable::init();
        for vpn in [13, 2, 7] {
            *table.entry_or_insert(vpn).unwrap() = PageTableEntry::map(vpn, Access::Read);
        }
        let vpns: Vec<_> = table.iter().map(|(vpn, _)| vpn).collect();
        assert_eq!(vpns, vec![2, 7, 13]);
        assert_eq!(table.iter().len(), 3);
    }

    #[test]
    fn cloned_table_is_independent() {
        let mut table: PageTable<4> = PageTable::init();
        *table.entry_or_insert(1).unwrap() = PageTableEntry::map(3, Access::Write);
        let copy = table.clone();
        table.entry_mut(1).unwrap().unwrap().clear();
        assert_eq!(copy.entry(1).unwrap().unwrap().pfn, Some(3));
    }
}
