use std::fmt::{self, Debug, Formatter};

use ::context::stack::Stack;
use memory_pool::memory::Memory;

/// A `Context` stores a suspended execution state, for it to be resumed later.
///
/// Resuming a `Context` freezes whatever is running right now and continues
/// the frozen state exactly where it left off. That state can in turn freeze
/// itself and hand control back, which is how every task and the scheduler
/// loop take turns on one thread.
pub(crate) struct Context(::context::Context);

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Context({:?})", self.0)
    }
}

/// Functions of this signature are used as the entry point for a new `Context`.
pub(crate) type ContextFn = extern "C" fn(t: ::context::Transfer) -> !;

impl Context {
    /// Creates a new `Context` prepared to execute `f` at the top of `stack`.
    ///
    /// `f` is not executed until the first call to `resume()`.
    ///
    /// # Safety
    ///
    /// `stack` must stay mapped, and must not be handed to anyone else, for as
    /// long as the returned `Context` or any context derived from it may run.
    pub(crate) unsafe fn new(stack: &Memory, f: ContextFn) -> Context {
        let stack = Stack::new(stack.top(), stack.bottom());
        Context(::context::Context::new(&stack, f))
    }

    /// Switches to `self`, passing `data` along.
    ///
    /// Returns once somebody switches back, with the context that did so.
    ///
    /// # Safety
    ///
    /// `self` must be a live context that has not finished.
    pub(crate) unsafe fn resume(self, data: usize) -> Transfer {
        Transfer::from(self.0.resume(data))
    }
}

/// What a switch hands to the resumed side: who switched, and with what.
#[derive(Debug)]
pub(crate) struct Transfer {
    pub(crate) context: Context,
    pub(crate) data: usize,
}

impl From<::context::Transfer> for Transfer {
    fn from(t: ::context::Transfer) -> Self {
        Transfer {
            context: Context(t.context),
            data: t.data,
        }
    }
}
