// Copyright 2016 coroutine-rs Developers
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

use std::io;
use std::os::raw::c_void;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;

//rlimit为无穷大时的上限
const FALLBACK_MAX_SIZE: usize = 1024 * 1024 * 1024;

static PAGE_SIZE: AtomicUsize = AtomicUsize::new(0);

static MAX_SIZE: Lazy<usize> = Lazy::new(|| {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    let ret = unsafe { libc::getrlimit(libc::RLIMIT_STACK, &mut limit) };
    if ret != 0 || limit.rlim_max == libc::RLIM_INFINITY {
        return FALLBACK_MAX_SIZE;
    }
    usize::try_from(limit.rlim_max).unwrap_or(FALLBACK_MAX_SIZE)
});

pub fn page_size() -> usize {
    let mut ret = PAGE_SIZE.load(Ordering::Relaxed);
    if ret == 0 {
        ret = match unsafe { libc::sysconf(libc::_SC_PAGESIZE) } {
            size if size > 0 => size as usize,
            _ => 4096,
        };
        PAGE_SIZE.store(ret, Ordering::Relaxed);
    }
    ret
}

pub fn min_size() -> usize {
    page_size()
}

/// Largest mapping (usable stack plus guard page) a stack may occupy.
pub fn max_size() -> usize {
    *MAX_SIZE
}

pub unsafe fn allocate(size: usize) -> io::Result<*mut c_void> {
    const PROT: libc::c_int = libc::PROT_READ | libc::PROT_WRITE;
    const TYPE: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON;
    let ptr = libc::mmap(ptr::null_mut(), size, PROT, TYPE, -1, 0);
    if ptr == libc::MAP_FAILED {
        Err(io::Error::last_os_error())
    } else {
        Ok(ptr)
    }
}

/// Turns the lowest `size` bytes at `bottom` into an inaccessible guard region.
pub unsafe fn protect(bottom: *mut c_void, size: usize) -> io::Result<()> {
    if libc::mprotect(bottom, size, libc::PROT_NONE) == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

pub unsafe fn deallocate(ptr: *mut c_void, size: usize) {
    libc::munmap(ptr, size);
}
