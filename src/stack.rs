/// The call stack
///
/// One contiguous region of the heap, used bottom-up: a push writes at `sp`
/// and then moves `sp` up by a word. Operands and call frames share it, and
/// because it sits in the heap, temporaries and parameters have ordinary heap
/// addresses (`lea` and kernels rely on that).
use crate::error::{VmError, VmResult};
use crate::heap::Heap;

#[derive(Debug, Clone)]
pub struct Stack {
    base: u16,
    /// One past the last usable byte
    limit: u16,
    pub sp: u16,
}

impl Stack {
    pub fn new(heap: &mut Heap, size: usize) -> VmResult<Self> {
        let base = heap.alloc(size)?;
        Ok(Stack {
            base,
            limit: base + size as u16,
            sp: base,
        })
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn limit(&self) -> u16 {
        self.limit
    }

    /// Number of words currently on the stack
    pub fn depth(&self) -> usize {
        (self.sp - self.base) as usize / 2
    }

    pub fn push(&mut self, heap: &mut Heap, value: u16) -> VmResult<()> {
        if self.sp >= self.limit {
            return Err(VmError::StackBlown);
        }
        heap.write_word(self.sp, value);
        self.sp += 2;
        Ok(())
    }

    pub fn pop(&mut self, heap: &Heap) -> VmResult<u16> {
        if self.sp <= self.base {
            return Err(VmError::StackBlown);
        }
        self.sp -= 2;
        Ok(heap.read_word(self.sp))
    }

    pub fn peek(&self, heap: &Heap) -> VmResult<u16> {
        if self.sp <= self.base {
            return Err(VmError::StackBlown);
        }
        Ok(heap.read_word(self.sp - 2))
    }

    /// Reserve `words` zeroed slots and return the address of the first one.
    pub fn reserve(&mut self, heap: &mut Heap, words: u16) -> VmResult<u16> {
        let start = self.sp;
        let end = start as usize + words as usize * 2;
        if end > self.limit as usize {
            return Err(VmError::StackBlown);
        }
        for addr in (start..end as u16).step_by(2) {
            heap.write_word(addr, 0);
        }
        self.sp = end as u16;
        Ok(start)
    }

    /// Address of the frame that starts `words` words below the top
    pub fn frame_base(&self, words: u16) -> VmResult<u16> {
        let bytes = words as usize * 2;
        if bytes > (self.sp - self.base) as usize {
            return Err(VmError::StackBlown);
        }
        Ok(self.sp - bytes as u16)
    }

    /// Move the stack pointer back to a previously recorded position
    pub fn unwind_to(&mut self, sp: u16) {
        self.sp = sp.clamp(self.base, self.limit);
    }
}
