use log::{debug, trace};

pub type Vpn = u32;
pub type Pfn = u32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TlbEntry {
    pub valid: bool,
    pub vpn: Vpn,
    pub pfn: Pfn,
}

/// Fixed-capacity translation cache.
///
/// Entries are not tagged with a process, so the whole cache has to be
/// flushed whenever a different address space becomes active. There is no
/// eviction: an insert into a full cache is dropped.
#[derive(Debug, Clone)]
pub struct Tlb {
    entries: Vec<TlbEntry>,
}

impl Tlb {
    pub fn init(capacity: usize) -> Self {
        Self {
            entries: vec![TlbEntry::default(); capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of valid entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lookup(&self, vpn: Vpn) -> Option<Pfn> {
        self.entries
            .iter()
            .find(|e| e.valid && e.vpn == vpn)
            .map(|e| e.pfn)
    }

    pub fn insert(&mut self, vpn: Vpn, pfn: Pfn) {
        match self.entries.iter_mut().find(|e| !e.valid) {
            Some(slot) => {
                *slot = TlbEntry {
                    valid: true,
                    vpn,
                    pfn,
                };
                trace!("tlb insert {} -> {}", vpn, pfn);
            }
            None => debug!("TLB full, dropping {} -> {}", vpn, pfn),
        }
    }

    /// Clears every entry for `vpn`, duplicates included.
    pub fn invalidate(&mut self, vpn: Vpn) {
        for entry in self.entries.iter_mut().filter(|e| e.valid && e.vpn == vpn) {
            entry.valid = false;
        }
    }

    pub fn flush(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.valid = false;
        }
        trace!("tlb flushed");
    }

    /// Valid entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &TlbEntry> {
        self.entries.iter().filter(|e| e.valid)
    }
}
