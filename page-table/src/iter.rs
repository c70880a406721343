use super::{PageTableEntry, Vpn};

/// Snapshot of the entries of a page table that hold a frame, in vpn order.
pub struct PageTableIterator {
    current: usize,
    entries: Vec<(Vpn, PageTableEntry)>,
}

impl PageTableIterator {
    pub fn new(entries: Vec<(Vpn, PageTableEntry)>) -> Self {
        Self {
            current: 0,
            entries,
        }
    }
}

impl Iterator for PageTableIterator {
    type Item = (Vpn, PageTableEntry);

    fn next(&mut self) -> Option<Self::Item> {
        let entry = *self.entries.get(self.current)?;
        self.current += 1;
        Some(entry)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.entries.len() - self.current;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PageTableIterator {}
