use page_table::PageTable;

pub type Pid = u32;

/// A simulated process. It owns its page table; the frames its entries point
/// at are shared through the frame table.
#[derive(Debug)]
pub struct Process<const PTES_PER_PAGE: usize> {
    pub pid: Pid,
    pub page_table: PageTable<PTES_PER_PAGE>,
}

impl<const PTES_PER_PAGE: usize> Process<PTES_PER_PAGE> {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            page_table: PageTable::init(),
        }
    }
}
