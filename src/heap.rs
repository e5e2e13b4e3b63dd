/// The script heap
///
/// A flat little-endian byte arena addressed with 16-bit heap addresses.
/// Address 0 is the null pointer and is never handed out. Objects, clones,
/// script locals and strings, and the call stack all live here, so every value
/// a script can hold in a variable is a word that may point into this arena.
use crate::error::{VmError, VmResult};
use log::trace;
use std::collections::BTreeMap;

/// First address the allocator may hand out
const HEAP_START: usize = 2;

pub struct Heap {
    mem: Vec<u8>,
    /// Allocated blocks: start -> size in bytes
    blocks: BTreeMap<u16, u16>,
    /// Free ranges sorted by start: (start, size)
    free: Vec<(usize, usize)>,
}

impl Heap {
    pub fn new(size: usize) -> Self {
        let size = size.min(0xFFFE) & !1;
        Heap {
            mem: vec![0; size],
            blocks: BTreeMap::new(),
            free: vec![(HEAP_START, size - HEAP_START)],
        }
    }

    pub fn size(&self) -> usize {
        self.mem.len()
    }

    /// Allocate a zeroed, word-aligned block (first fit).
    pub fn alloc(&mut self, size: usize) -> VmResult<u16> {
        let size = (size.max(2) + 1) & !1;
        let slot = self
            .free
            .iter()
            .position(|&(_, len)| len >= size)
            .ok_or(VmError::HeapExhausted { requested: size })?;

        let (start, len) = self.free[slot];
        if len == size {
            self.free.remove(slot);
        } else {
            self.free[slot] = (start + size, len - size);
        }
        self.mem[start..start + size].fill(0);
        self.blocks.insert(start as u16, size as u16);
        trace!("heap: alloc {size} bytes at {start:04x}");
        Ok(start as u16)
    }

    /// Return a block to the free list, merging with its neighbours.
    pub fn free(&mut self, addr: u16) -> VmResult<()> {
        let size = self.blocks.remove(&addr).ok_or_else(|| {
            VmError::Relocation(format!("free of unallocated heap block {addr:04x}"))
        })? as usize;
        trace!("heap: free {size} bytes at {addr:04x}");

        let start = addr as usize;
        let at = self.free.partition_point(|&(s, _)| s < start);
        self.free.insert(at, (start, size));

        if at + 1 < self.free.len() {
            let (s, l) = self.free[at];
            let (ns, nl) = self.free[at + 1];
            if s + l == ns {
                self.free[at] = (s, l + nl);
                self.free.remove(at + 1);
            }
        }
        if at > 0 {
            let (ps, pl) = self.free[at - 1];
            let (s, l) = self.free[at];
            if ps + pl == s {
                self.free[at - 1] = (ps, pl + l);
                self.free.remove(at);
            }
        }
        Ok(())
    }

    /// Size of the block starting at `addr`, if it is allocated
    pub fn block_size(&self, addr: u16) -> Option<usize> {
        self.blocks.get(&addr).map(|&s| s as usize)
    }

    pub fn bytes_free(&self) -> usize {
        self.free.iter().map(|&(_, len)| len).sum()
    }

    pub fn largest_free(&self) -> usize {
        self.free.iter().map(|&(_, len)| len).max().unwrap_or(0)
    }

    /// True when `addr..addr+len` lies inside the arena
    pub fn contains(&self, addr: u16, len: usize) -> bool {
        addr as usize + len <= self.mem.len()
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        self.mem.get(addr as usize).copied().unwrap_or(0)
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        if let Some(b) = self.mem.get_mut(addr as usize) {
            *b = value;
        }
    }

    pub fn read_word(&self, addr: u16) -> u16 {
        let a = addr as usize;
        match self.mem.get(a..a + 2) {
            Some(bytes) => u16::from_le_bytes([bytes[0], bytes[1]]),
            None => 0,
        }
    }

    pub fn write_word(&mut self, addr: u16, value: u16) {
        let a = addr as usize;
        if let Some(bytes) = self.mem.get_mut(a..a + 2) {
            bytes.copy_from_slice(&value.to_le_bytes());
        }
    }

    pub fn copy_in(&mut self, addr: u16, bytes: &[u8]) {
        let a = addr as usize;
        if a >= self.mem.len() {
            return;
        }
        let end = (a + bytes.len()).min(self.mem.len());
        self.mem[a..end].copy_from_slice(&bytes[..end - a]);
    }

    /// Copy `len` bytes inside the arena
    pub fn copy_within(&mut self, from: u16, to: u16, len: usize) {
        let from = from as usize;
        self.mem.copy_within(from..from + len, to as usize);
    }

    /// Read a NUL-terminated string starting at `addr`
    pub fn read_string(&self, addr: u16) -> String {
        let start = addr as usize;
        let end = self.mem[start.min(self.mem.len())..]
            .iter()
            .position(|&b| b == 0)
            .map(|p| start + p)
            .unwrap_or(self.mem.len());
        self.mem[start.min(end)..end].iter().map(|&b| b as char).collect()
    }

    /// Write `text` plus a terminating NUL at `addr`
    pub fn write_string(&mut self, addr: u16, text: &[u8]) {
        self.copy_in(addr, text);
        self.write_byte(addr.wrapping_add(text.len() as u16), 0);
    }

    /// Raw view of the whole arena, for comparisons in diagnostics and tests
    pub fn snapshot(&self) -> Vec<u8> {
        self.mem.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn alloc_is_aligned_and_zeroed() {
        let mut heap = Heap::new(0x400);
        let a = heap.alloc(3).unwrap();
        assert_eq!(a % 2, 0);
        assert_ne!(a, 0);
        assert_eq!(heap.block_size(a), Some(4));
        heap.write_word(a, 0xBEEF);
        heap.free(a).unwrap();
        let b = heap.alloc(4).unwrap();
        assert_eq!(b, a);
        assert_eq!(heap.read_word(b), 0);
    }

    #[test]
    fn freed_neighbours_coalesce() {
        let mut heap = Heap::new(0x100);
        let total = heap.bytes_free();
        let a = heap.alloc(0x20).unwrap();
        let b = heap.alloc(0x20).unwrap();
        let c = heap.alloc(0x20).unwrap();
        heap.free(a).unwrap();
        heap.free(c).unwrap();
        heap.free(b).unwrap();
        assert_eq!(heap.bytes_free(), total);
        assert_eq!(heap.largest_free(), total);
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut heap = Heap::new(0x100);
        let err = heap.alloc(0x200).unwrap_err();
        assert_eq!(err, VmError::HeapExhausted { requested: 0x200 });
    }

    #[test]
    fn double_free_is_an_error() {
        let mut heap = Heap::new(0x100);
        let a = heap.alloc(8).unwrap();
        heap.free(a).unwrap();
        assert!(heap.free(a).is_err());
    }

    #[test]
    fn strings_round_trip() {
        let mut heap = Heap::new(0x100);
        let a = heap.alloc(16).unwrap();
        heap.write_string(a, b"ego");
        assert_eq!(heap.read_string(a), "ego");
    }
}
