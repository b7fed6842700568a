use crate::cpu_bus::Width;

pub const RDRAM_SIZE: usize = 0x40_0000;
pub const RDRAM_EXPANDED_SIZE: usize = 0x80_0000;
pub const SP_MEM_SIZE: usize = 0x1000;
pub const PIF_RAM_SIZE: usize = 0x40;
pub const PAGE_SIZE: usize = 0x1000;

/// Big-endian byte-addressed RAM that remembers which pages have been touched.
pub struct Ram {
    data: Vec<u8>,
    touched: Vec<u64>,
    touched_pages: usize,
}

impl Ram {
    pub fn new(size: usize) -> Self {
        let pages = size.div_ceil(PAGE_SIZE);
        Ram {
            data: vec![0; size],
            touched: vec![0; pages.div_ceil(64)],
            touched_pages: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Caller guarantees `offset + width <= len`.
    pub fn read(&mut self, offset: usize, width: Width) -> u64 {
        self.touch(offset);
        let bytes = &self.data[offset..offset + width.bytes()];
        bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }

    pub fn write(&mut self, offset: usize, width: Width, value: u64) {
        self.touch(offset);
        let n = width.bytes();
        for (i, byte) in self.data[offset..offset + n].iter_mut().enumerate() {
            *byte = (value >> ((n - 1 - i) * 8)) as u8;
        }
    }

    /// Bulk copy used by boot and DMA; bytes past the end are dropped.
    pub fn copy_in(&mut self, offset: usize, src: &[u8]) -> usize {
        if offset >= self.data.len() {
            return 0;
        }
        let n = src.len().min(self.data.len() - offset);
        self.data[offset..offset + n].copy_from_slice(&src[..n]);
        let mut page = offset / PAGE_SIZE * PAGE_SIZE;
        while page < offset + n {
            self.touch(page);
            page += PAGE_SIZE;
        }
        n
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn touched_bytes(&self) -> u64 {
        (self.touched_pages * PAGE_SIZE) as u64
    }

    fn touch(&mut self, offset: usize) {
        let page = offset / PAGE_SIZE;
        let (word, bit) = (page / 64, page % 64);
        if self.touched[word] & (1 << bit) == 0 {
            self.touched[word] |= 1 << bit;
            self.touched_pages += 1;
        }
    }
}
