// Copyright 2016 coroutine-rs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::os::raw::c_void;

use thiserror::Error;

use crate::system;

/// Error type returned by stack allocation methods.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Contains the maximum amount of memory allowed to be allocated as stack space.
    #[error("requested more than max size of {0} bytes for a stack")]
    ExceedsMaximumSize(usize),

    /// Returned if some kind of I/O error happens during allocation.
    #[error("stack allocation failed: {0}")]
    IoError(#[from] io::Error),
}

/// An owned, page-aligned stack mapping.
///
/// The stack grows downwards from `top()` towards `bottom()`. A protected stack
/// has one extra inaccessible page below `bottom()`, so running off the end
/// faults instead of silently corrupting a neighbour. The mapping is released
/// when the `Memory` is dropped.
#[derive(Debug, Eq, PartialEq)]
pub struct Memory {
    top: *mut c_void,
    bottom: *mut c_void,
    protected: bool,
}

unsafe impl Send for Memory {}

impl Memory {
    /// Allocates a new stack of **at least** `size` bytes + one additional guard page.
    ///
    /// `size` is rounded up to a multiple of the size of a memory page and
    /// does not include the size of the guard page itself.
    pub fn new(size: usize) -> Result<Memory, MemoryError> {
        Memory::allocate(size, true)
    }

    /// The usable length a request for `size` bytes ends up with.
    pub fn round_size(size: usize) -> usize {
        let page_size = system::page_size();
        let size = size.max(system::min_size());
        size.saturating_add(page_size - 1) & !(page_size - 1)
    }

    fn allocate(size: usize, protected: bool) -> Result<Memory, MemoryError> {
        let page_size = system::page_size();
        let max_size = system::max_size();
        let guard = if protected { page_size } else { 0 };
        let size = Memory::round_size(size);
        let total = match size.checked_add(guard) {
            Some(total) if total <= max_size => total,
            _ => return Err(MemoryError::ExceedsMaximumSize(max_size - guard)),
        };
        let base = unsafe { system::allocate(total)? };
        if protected {
            if let Err(err) = unsafe { system::protect(base, guard) } {
                unsafe { system::deallocate(base, total) };
                return Err(err.into());
            }
        }
        Ok(Memory {
            top: (base as usize + total) as *mut c_void,
            bottom: (base as usize + guard) as *mut c_void,
            protected,
        })
    }

    /// Returns the top of the stack from which on it grows downwards towards bottom().
    #[inline]
    pub fn top(&self) -> *mut c_void {
        self.top
    }

    /// Returns the bottom of the stack and thus it's end.
    #[inline]
    pub fn bottom(&self) -> *mut c_void {
        self.bottom
    }

    #[inline]
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    /// Returns the size of the stack between top() and bottom().
    #[inline]
    pub fn len(&self) -> usize {
        self.top as usize - self.bottom as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the minimal stack size allowed by the current platform.
    #[inline]
    pub fn min_size() -> usize {
        system::min_size()
    }

    /// Returns the maximum usable stack size allowed by the current platform.
    #[inline]
    pub fn max_size(&self) -> usize {
        let guard = if self.protected { system::page_size() } else { 0 };
        system::max_size() - guard
    }
}

impl Drop for Memory {
    fn drop(&mut self) {
        let mut ptr = self.bottom;
        let mut size = self.len();
        if self.protected {
            let page_size = system::page_size();
            ptr = (self.bottom as usize - page_size) as *mut c_void;
            size += page_size;
        }
        unsafe {
            system::deallocate(ptr, size);
        }
    }
}
