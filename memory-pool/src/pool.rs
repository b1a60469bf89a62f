use crate::memory::{Memory, MemoryError};
use crossbeam_deque::Worker;

/// Reusable stacks of one usable size.
#[derive(Debug)]
pub struct SizedMemoryPool {
    //内存大小
    size: usize,
    //可用的栈
    available: Worker<Memory>,
    //借出未归还的栈数量
    using: usize,
}

impl SizedMemoryPool {
    pub fn new(size: usize) -> Self {
        SizedMemoryPool {
            size: Memory::round_size(size),
            available: Worker::new_fifo(),
            using: 0,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn allocate(&mut self) -> Result<Memory, MemoryError> {
        let stack = match self.available.pop() {
            Some(stack) => stack,
            //新申请栈
            None => Memory::new(self.size)?,
        };
        self.using += 1;
        Ok(stack)
    }

    /// Takes a stack back for reuse.
    pub fn revert(&mut self, stack: Memory) {
        self.using = self.using.saturating_sub(1);
        if stack.len() == self.size {
            self.available.push(stack);
        }
    }

    /// Forgets about a lent stack and unmaps it.
    pub fn release(&mut self, stack: Memory) {
        self.using = self.using.saturating_sub(1);
        drop(stack);
    }

    pub fn available(&self) -> usize {
        self.available.len()
    }

    pub fn using(&self) -> usize {
        self.using
    }
}
