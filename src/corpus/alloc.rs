//! Chunk backing stores.
//!
//! Chunks are fixed-capacity byte arenas. The builder asks an allocator
//! for a fresh store whenever the current chunk cannot satisfy an
//! allocation; stores are either plain heap buffers or anonymous memory
//! maps, so large corpora can live outside the allocator heap.

use anyhow::{Context, Result};
use memmap2::MmapMut;

/// A single chunk's backing buffer, fixed at creation.
pub trait ChunkStore: Send + Sync {
    fn capacity(&self) -> usize;
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
}

/// Hands out chunk stores of a fixed capacity.
pub trait ChunkAllocator: Send {
    fn chunk_size(&self) -> usize;
    fn new_store(&mut self) -> Result<Box<dyn ChunkStore>>;
}

/// Heap-backed store
struct HeapStore(Vec<u8>);

impl ChunkStore for HeapStore {
    fn capacity(&self) -> usize {
        self.0.len()
    }
    fn bytes(&self) -> &[u8] {
        &self.0
    }
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// Allocates chunks as zeroed heap buffers.
pub struct HeapAllocator {
    chunk_size: usize,
}

impl HeapAllocator {
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self { chunk_size }
    }
}

impl ChunkAllocator for HeapAllocator {
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn new_store(&mut self) -> Result<Box<dyn ChunkStore>> {
        Ok(Box::new(HeapStore(vec![0u8; self.chunk_size])))
    }
}

/// Anonymous-mmap-backed store
struct MmapStore(MmapMut);

impl ChunkStore for MmapStore {
    fn capacity(&self) -> usize {
        self.0.len()
    }
    fn bytes(&self) -> &[u8] {
        &self.0
    }
    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// Allocates chunks as anonymous memory maps. The kernel only commits
/// pages that are actually written, so oversizing chunks is cheap.
pub struct MmapAllocator {
    chunk_size: usize,
}

impl MmapAllocator {
    pub fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self { chunk_size }
    }
}

impl ChunkAllocator for MmapAllocator {
    fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    fn new_store(&mut self) -> Result<Box<dyn ChunkStore>> {
        let map = MmapMut::map_anon(self.chunk_size).context("mmap chunk allocation failed")?;
        Ok(Box::new(MmapStore(map)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_store_roundtrip() {
        let mut alloc = HeapAllocator::new(64);
        let mut store = alloc.new_store().unwrap();
        assert_eq!(store.capacity(), 64);
        store.bytes_mut()[..5].copy_from_slice(b"hello");
        assert_eq!(&store.bytes()[..5], b"hello");
    }

    #[test]
    fn test_mmap_store_roundtrip() {
        let mut alloc = MmapAllocator::new(4096);
        let mut store = alloc.new_store().unwrap();
        assert_eq!(store.capacity(), 4096);
        store.bytes_mut()[..5].copy_from_slice(b"mmap!");
        assert_eq!(&store.bytes()[..5], b"mmap!");
    }
}
