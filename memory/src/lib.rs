pub mod bitmap;

use std::fmt;

use log::{debug, warn};

use bitmap::Bitmap;

pub type Pfn = u32;

/// A frame may never be referenced by more page table entries than this.
pub const MAX_MAPCOUNT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    OutOfMemory,
    OverCapacity,
    NotMapped,
    MapcountOverflow,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::OutOfMemory => write!(f, "no free page frame"),
            MemoryError::OverCapacity => write!(f, "page frame number out of range"),
            MemoryError::NotMapped => write!(f, "page frame has no mappings"),
            MemoryError::MapcountOverflow => {
                write!(f, "page frame already has {} mappings", MAX_MAPCOUNT)
            }
        }
    }
}

/// The number of page table entries pointing at each physical frame.
///
/// A frame is free when its mapcount is zero. The used-frame bitmap is kept in
/// step with the counts so the allocator always finds the lowest free frame.
#[derive(Debug, Clone)]
pub struct FrameTable<const NR_FRAMES: usize> {
    mapcounts: Vec<u32>,
    used: Bitmap<NR_FRAMES>,
}

impl<const NR_FRAMES: usize> FrameTable<NR_FRAMES> {
    pub fn init() -> Self {
        assert!(NR_FRAMES > 0, "Frame pool must not be empty");
        Self {
            mapcounts: vec![0; NR_FRAMES],
            used: Bitmap::new(),
        }
    }

    pub fn capacity() -> usize {
        NR_FRAMES
    }

    pub fn check_frame(&self, pfn: Pfn) -> Result<(), MemoryError> {
        if pfn as usize >= NR_FRAMES {
            return Err(MemoryError::OverCapacity);
        }
        Ok(())
    }

    pub fn mapcount(&self, pfn: Pfn) -> Result<u32, MemoryError> {
        self.check_frame(pfn)?;
        Ok(self.mapcounts[pfn as usize])
    }

    /// The lowest-numbered frame nobody maps, if any.
    pub fn lowest_free(&self) -> Option<Pfn> {
        self.used.first_clear().map(|frame| frame as Pfn)
    }

    /// Claims the lowest free frame for a single new mapping.
    pub fn allocate_frame(&mut self) -> Result<Pfn, MemoryError> {
        let pfn = match self.lowest_free() {
            Some(pfn) => pfn,
            None => {
                warn!("No free frames");
                return Err(MemoryError::OutOfMemory);
            }
        };
        self.get(pfn)?;
        Ok(pfn)
    }

    /// Adds one mapping to `pfn`, returning the new mapcount.
    pub fn get(&mut self, pfn: Pfn) -> Result<u32, MemoryError> {
        self.check_frame(pfn)?;
        let count = &mut self.mapcounts[pfn as usize];
        if *count >= MAX_MAPCOUNT {
            return Err(MemoryError::MapcountOverflow);
        }
        *count += 1;
        if *count == 1 {
            self.used.set(pfn as usize);
        }
        debug!("mapcount[{}] -> {}", pfn, *count);
        Ok(*count)
    }

    /// Drops one mapping from `pfn`, returning the new mapcount.
    pub fn put(&mut self, pfn: Pfn) -> Result<u32, MemoryError> {
        self.check_frame(pfn)?;
        let count = &mut self.mapcounts[pfn as usize];
        if *count == 0 {
            return Err(MemoryError::NotMapped);
        }
        *count -= 1;
        if *count == 0 {
            self.used.clear(pfn as usize);
        }
        debug!("mapcount[{}] -> {}", pfn, *count);
        Ok(*count)
    }

    /// Whether `extra` more mappings fit on `pfn`.
    pub fn can_share(&self, pfn: Pfn, extra: u32) -> Result<bool, MemoryError> {
        Ok(self.mapcount(pfn)? + extra <= MAX_MAPCOUNT)
    }

    pub fn free_frames(&self) -> usize {
        NR_FRAMES - self.used.count_set()
    }

    /// `(pfn, mapcount)` for every frame with at least one mapping.
    pub fn iter_used(&self) -> impl Iterator<Item = (Pfn, u32)> + '_ {
        self.mapcounts
            .iter()
            .enumerate()
            .filter(|(_, count)| **count > 0)
            .map(|(pfn, count)| (pfn as Pfn, *count))
    }
}

impl<const NR_FRAMES: usize> Default for FrameTable<NR_FRAMES> {
    fn default() -> Self {
        Self::init()
    }
}
