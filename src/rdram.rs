#[allow(unused_imports)]
use tracing::{trace, debug, error, warn, info};

use crate::{Addressable, ReadWriteFault};

/// Flat RDRAM as seen from physical address 0. Words are stored in guest (big endian) order
/// already decoded to host integers.
pub struct Rdram {
    ram: Vec<u32>,
}

impl Rdram {
    /// `size` in bytes, rounded down to whole words
    pub fn new(size: usize) -> Self {
        Self { ram: vec![0u32; size >> 2] }
    }

    pub fn len(&self) -> usize {
        self.ram.len() << 2
    }

    pub fn is_empty(&self) -> bool {
        self.ram.is_empty()
    }

    pub fn write_u32(&mut self, value: u32, offset: usize) -> Result<(), ReadWriteFault> {
        trace!(target: "RDRAM", "write32 value=${:08X} offset=${:08X}", value, offset);
        match self.ram.get_mut(offset >> 2) {
            Some(word) => { *word = value; Ok(()) },
            None => Err(ReadWriteFault::Invalid),
        }
    }

    pub fn load_words(&mut self, offset: usize, words: &[u32]) -> Result<(), ReadWriteFault> {
        let start = offset >> 2;
        let dest = self.ram.get_mut(start..start + words.len()).ok_or(ReadWriteFault::Invalid)?;
        dest.copy_from_slice(words);
        Ok(())
    }

    /// Copy a big endian image to `offset`. A trailing partial word is zero padded.
    pub fn load(&mut self, offset: usize, data: &[u8]) -> Result<(), ReadWriteFault> {
        let words: Vec<u32> = data.chunks(4).map(|chunk| {
            let mut bytes = [0u8; 4];
            bytes[..chunk.len()].copy_from_slice(chunk);
            u32::from_be(bytemuck::cast(bytes))
        }).collect();

        debug!(target: "RDRAM", "loading {} bytes at ${:08X}", data.len(), offset);
        self.load_words(offset, &words)
    }
}

impl Addressable for Rdram {
    fn read_u32(&mut self, offset: usize) -> Result<u32, ReadWriteFault> {
        trace!(target: "RDRAM", "read32 offset=${:08X}", offset);
        self.ram.get(offset >> 2).copied().ok_or(ReadWriteFault::Invalid)
    }

    fn read_block(&mut self, offset: usize, length: u32) -> Result<Vec<u32>, ReadWriteFault> {
        let start = offset >> 2;
        self.ram.get(start..start + (length as usize >> 2)).map(<[u32]>::to_vec).ok_or(ReadWriteFault::Invalid)
    }
}
