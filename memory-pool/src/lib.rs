//! Guard-paged stacks for coroutines, recycled per size.

pub mod memory;

pub mod pool;

mod system;

use crate::memory::{Memory, MemoryError};
use crate::pool::SizedMemoryPool;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

static MEMORY_POOL: Lazy<Mutex<HashMap<usize, SizedMemoryPool>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn pools() -> MutexGuard<'static, HashMap<usize, SizedMemoryPool>> {
    match MEMORY_POOL.lock() {
        Ok(map) => map,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Lends a stack of at least `size` usable bytes, reusing a reverted one if possible.
pub fn allocate(size: usize) -> Result<Memory, MemoryError> {
    let size = Memory::round_size(size);
    pools()
        .entry(size)
        .or_insert_with(|| SizedMemoryPool::new(size))
        .allocate()
}

/// Hands a stack back for reuse.
pub fn revert(stack: Memory) {
    let mut map = pools();
    match map.get_mut(&stack.len()) {
        Some(pool) => pool.revert(stack),
        None => drop(stack),
    }
}

/// Hands a stack back and unmaps it.
pub fn release(stack: Memory) {
    let mut map = pools();
    match map.get_mut(&stack.len()) {
        Some(pool) => pool.release(stack),
        None => drop(stack),
    }
}

pub fn default_size() -> usize {
    system::default_size()
}

pub fn default() -> Result<Memory, MemoryError> {
    allocate(default_size())
}

/// `(available, using)` counts of the pool serving `size`, if one exists.
pub fn usage(size: usize) -> Option<(usize, usize)> {
    pools()
        .get(&Memory::round_size(size))
        .map(|pool| (pool.available(), pool.using()))
}

#[cfg(test)]
mod tests {
    use crate::{allocate, release, revert, system, usage};

    #[test]
    fn test_memory_pool() {
        //独占一个尺寸，避免与其他测试互相影响
        let size = system::page_size() * 7;
        assert_eq!(None, usage(size));
        let stack = allocate(size).unwrap();
        assert_eq!(size, stack.len());
        assert_eq!(Some((0, 1)), usage(size));
        revert(stack);
        assert_eq!(Some((1, 0)), usage(size));
        let stack = allocate(size - 1).unwrap();
        assert_eq!(Some((0, 1)), usage(size));
        release(stack);
        assert_eq!(Some((0, 0)), usage(size));
    }

    #[test]
    fn default_stack() {
        let stack = crate::default().unwrap();
        assert_eq!(crate::default_size(), stack.len());
        revert(stack);
    }
}
