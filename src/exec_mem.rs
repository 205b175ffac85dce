//! Executable memory for generated code. Regions are writable while a block is being compiled
//! and sealed (read + execute) once it is linked.

use dynasmrt::mmap::{ExecutableBuffer, MutableBuffer};

#[allow(unused_imports)]
use tracing::{trace, debug, error, warn, info};

use crate::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaKind {
    // page-mapped memory that can be made executable
    Mapped,
    // plain heap memory, for hosts without executable mappings or when the code is only ever
    // interpreted
    Heap,
}

impl Default for ArenaKind {
    fn default() -> Self {
        cfg_if::cfg_if! {
            if #[cfg(any(unix, windows))] {
                ArenaKind::Mapped
            } else {
                ArenaKind::Heap
            }
        }
    }
}

enum Backing {
    Writable(MutableBuffer),
    Sealed(ExecutableBuffer),
    Heap(Box<[u8]>),
}

/// One contiguous code buffer owned by a block
pub struct Region {
    backing: Backing,
    size: usize,
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.backing {
            Backing::Writable(_) => "writable",
            Backing::Sealed(_)   => "sealed",
            Backing::Heap(_)     => "heap",
        };
        write!(f, "Region {{ size: {}, {} }}", self.size, state)
    }
}

impl Region {
    /// Zero sized stand-in, not accounted to any arena
    pub(crate) fn empty() -> Region {
        Region { backing: Backing::Heap(Box::default()), size: 0 }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.backing, Backing::Sealed(_))
    }

    pub fn as_slice(&self) -> &[u8] {
        match &self.backing {
            Backing::Writable(buf) => &buf[..],
            Backing::Sealed(buf)   => &buf[..],
            Backing::Heap(buf)     => &buf[..],
        }
    }

    /// None while the region is sealed
    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        match &mut self.backing {
            Backing::Writable(buf) => Some(&mut buf[..]),
            Backing::Sealed(_)     => None,
            Backing::Heap(buf)     => Some(&mut buf[..]),
        }
    }

    /// Flip a writable mapping to read + execute. Heap regions are left alone.
    pub fn seal(&mut self) -> Result<(), CompileError> {
        let backing = std::mem::replace(&mut self.backing, Region::empty().backing);
        self.backing = match backing {
            Backing::Writable(buf) => Backing::Sealed(buf.make_exec()?),
            other => other,
        };
        Ok(())
    }

    /// Make a sealed mapping writable again
    pub fn unseal(&mut self) -> Result<(), CompileError> {
        let backing = std::mem::replace(&mut self.backing, Region::empty().backing);
        self.backing = match backing {
            Backing::Sealed(buf) => Backing::Writable(buf.make_mut()?),
            other => other,
        };
        Ok(())
    }
}

/// Hands out and recycles code regions, and keeps a count of what is live
#[derive(Debug, Default)]
pub struct ExecutableArena {
    kind: ArenaKind,
    live_bytes: usize,
    grows: usize,
}

impl ExecutableArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kind(kind: ArenaKind) -> Self {
        Self { kind, ..Default::default() }
    }

    pub fn kind(&self) -> ArenaKind {
        self.kind
    }

    pub fn live_bytes(&self) -> usize {
        self.live_bytes
    }

    pub fn grows(&self) -> usize {
        self.grows
    }

    /// Acquire a zeroed, writable region of `size` bytes
    pub fn acquire(&mut self, size: usize) -> Result<Region, CompileError> {
        let backing = match self.kind {
            ArenaKind::Mapped => {
                let mut buf = MutableBuffer::new(size).map_err(|err| {
                    error!(target: "EXECMEM", "couldn't map {} bytes of executable memory: {}", size, err);
                    CompileError::OutOfMemory { requested: size }
                })?;
                buf.set_len(size);
                Backing::Writable(buf)
            },

            ArenaKind::Heap => {
                let mut buf = Vec::new();
                if buf.try_reserve_exact(size).is_err() {
                    error!(target: "EXECMEM", "couldn't allocate {} bytes of code memory", size);
                    return Err(CompileError::OutOfMemory { requested: size });
                }
                buf.resize(size, 0u8);
                Backing::Heap(buf.into_boxed_slice())
            },
        };

        self.live_bytes += size;
        trace!(target: "EXECMEM", "acquired {} bytes ({} live)", size, self.live_bytes);
        Ok(Region { backing, size })
    }

    pub fn release(&mut self, region: Region) {
        self.live_bytes = self.live_bytes.saturating_sub(region.size);
        trace!(target: "EXECMEM", "released {} bytes ({} live)", region.size, self.live_bytes);
    }

    /// Move `region` into a new region of `new_size` bytes. The first min(old, new) bytes are
    /// carried over and the old region is released. On failure the old region is released as
    /// well and the code it held is lost.
    pub fn grow(&mut self, region: Region, new_size: usize) -> Result<Region, CompileError> {
        let mut new_region = match self.acquire(new_size) {
            Ok(new_region) => new_region,
            Err(err) => {
                self.release(region);
                return Err(err);
            },
        };

        let copy = region.size.min(new_size);
        if let Some(dest) = new_region.as_mut_slice() {
            dest[..copy].copy_from_slice(&region.as_slice()[..copy]);
        }

        debug!(target: "EXECMEM", "grew code region from {} to {} bytes", region.size, new_size);
        self.release(region);
        self.grows += 1;
        Ok(new_region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(region: &mut Region) {
        let slice = region.as_mut_slice().unwrap();
        for (i, b) in slice.iter_mut().enumerate() {
            *b = (i * 7) as u8;
        }
    }

    #[test]
    fn heap_grow_keeps_contents() {
        let mut arena = ExecutableArena::with_kind(ArenaKind::Heap);
        let mut region = arena.acquire(64).unwrap();
        fill(&mut region);
        let before = region.as_slice().to_vec();

        let region = arena.grow(region, 64 + 8192).unwrap();
        assert_eq!(region.size(), 64 + 8192);
        assert_eq!(&region.as_slice()[..64], &before[..]);
        assert!(region.as_slice()[64..].iter().all(|&b| b == 0));
        assert_eq!(arena.live_bytes(), 64 + 8192);
        assert_eq!(arena.grows(), 1);

        arena.release(region);
        assert_eq!(arena.live_bytes(), 0);
    }

    #[test]
    fn shrinking_truncates() {
        let mut arena = ExecutableArena::with_kind(ArenaKind::Heap);
        let mut region = arena.acquire(128).unwrap();
        fill(&mut region);
        let before = region.as_slice()[..32].to_vec();
        let region = arena.grow(region, 32).unwrap();
        assert_eq!(region.as_slice(), &before[..]);
    }

    #[test]
    fn mapped_seal_round_trip() {
        let mut arena = ExecutableArena::with_kind(ArenaKind::Mapped);
        let mut region = arena.acquire(4096).unwrap();
        fill(&mut region);
        let before = region.as_slice().to_vec();

        region.seal().unwrap();
        assert!(region.is_sealed());
        assert!(region.as_mut_slice().is_none());
        assert_eq!(region.as_slice(), &before[..]);

        region.unseal().unwrap();
        assert!(!region.is_sealed());
        region.as_mut_slice().unwrap()[0] = 0xAA;
        assert_eq!(region.as_slice()[0], 0xAA);

        let region = arena.grow(region, 4096 + 8192).unwrap();
        assert_eq!(region.as_slice()[0], 0xAA);
        assert_eq!(&region.as_slice()[1..4096], &before[1..]);
    }

    #[test]
    fn heap_regions_ignore_sealing() {
        let mut arena = ExecutableArena::with_kind(ArenaKind::Heap);
        let mut region = arena.acquire(16).unwrap();
        region.seal().unwrap();
        assert!(!region.is_sealed());
        assert!(region.as_mut_slice().is_some());
    }
}
