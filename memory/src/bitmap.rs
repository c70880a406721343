/// One bit per physical frame, set while the frame has at least one mapping.
#[derive(Debug, Clone)]
pub struct Bitmap<const NR_FRAMES: usize> {
    bitmap: Vec<u8>,
}

impl<const NR_FRAMES: usize> Bitmap<NR_FRAMES> {
    /// How many bytes are required to store the bitmap
    pub fn size() -> usize {
        NR_FRAMES / 8 + if NR_FRAMES % 8 == 0 { 0 } else { 1 }
    }

    pub fn new() -> Bitmap<NR_FRAMES> {
        Bitmap {
            bitmap: vec![0; Self::size()],
        }
    }

    /// Lowest frame whose bit is clear.
    pub fn first_clear(&self) -> Option<usize> {
        for (i, byte) in self.bitmap.iter().enumerate() {
            if *byte == 0xff {
                continue;
            }
            for j in 0..8 {
                let frame = i * 8 + j;
                if frame >= NR_FRAMES {
                    return None;
                }
                if byte & (1 << j) == 0 {
                    return Some(frame);
                }
            }
        }
        None
    }

    pub fn set(&mut self, frame: usize) {
        self.bitmap[frame / 8] |= 1 << (frame % 8);
    }

    pub fn clear(&mut self, frame: usize) {
        self.bitmap[frame / 8] &= !(1 << (frame % 8));
    }

    pub fn is_set(&self, frame: usize) -> bool {
        self.bitmap[frame / 8] & (1 << (frame % 8)) != 0
    }

    pub fn count_set(&self) -> usize {
        self.bitmap.iter().map(|b| b.count_ones() as usize).sum()
    }
}

impl<const NR_FRAMES: usize> Default for Bitmap<NR_FRAMES> {
    fn default() -> Self {
        Self::new()
    }
}
