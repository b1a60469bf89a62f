use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::process;

use memory_pool::memory::{Memory, MemoryError};

use crate::context::{Context, Transfer};

pub(crate) type Entry = Box<dyn FnOnce() -> Result<(), String>>;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Status {
    ///协程被创建，尚未运行
    Created,
    ///运行中
    Running,
    ///被挂起
    Suspend,
    ///用户函数已返回
    Finished,
}

/// How the entry function of a coroutine ended.
pub(crate) enum Outcome {
    Returned,
    Failed(String),
    Panicked(Box<dyn Any + Send>),
}

/// A function running on its own stack that can suspend itself.
///
/// Must not move once it has been resumed: the running frames keep a pointer
/// to it. The scheduler keeps every coroutine behind an `Rc`.
pub(crate) struct Coroutine {
    stack: Option<Memory>,
    //挂起时保存的上下文
    context: Cell<Option<Context>>,
    //运行时保存的调用者上下文
    caller: Cell<Option<Context>>,
    status: Cell<Status>,
    entry: Cell<Option<Entry>>,
    outcome: Cell<Option<Outcome>>,
}

extern "C" fn coroutine_function(t: ::context::Transfer) -> ! {
    let t = Transfer::from(t);
    let coroutine = unsafe { &*(t.data as *const Coroutine) };
    coroutine.caller.set(Some(t.context));
    let outcome = match coroutine.entry.take() {
        //调用用户函数，panic不能越过栈边界
        Some(entry) => match panic::catch_unwind(AssertUnwindSafe(entry)) {
            Ok(Ok(())) => Outcome::Returned,
            Ok(Err(message)) => Outcome::Failed(message),
            Err(payload) => Outcome::Panicked(payload),
        },
        None => Outcome::Returned,
    };
    coroutine.outcome.set(Some(outcome));
    coroutine.status.set(Status::Finished);
    if let Some(caller) = coroutine.caller.take() {
        unsafe {
            caller.resume(0);
        }
    }
    //已结束的协程不会再被恢复
    process::abort()
}

impl Coroutine {
    pub(crate) fn new(size: usize, entry: Entry) -> Result<Self, MemoryError> {
        let stack = memory_pool::allocate(size)?;
        let context = unsafe { Context::new(&stack, coroutine_function) };
        Ok(Coroutine {
            stack: Some(stack),
            context: Cell::new(Some(context)),
            caller: Cell::new(None),
            status: Cell::new(Status::Created),
            entry: Cell::new(Some(entry)),
            outcome: Cell::new(None),
        })
    }

    #[cfg(test)]
    pub(crate) fn status(&self) -> Status {
        self.status.get()
    }

    pub(crate) fn started(&self) -> bool {
        self.status.get() != Status::Created
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.status.get() != Status::Finished
    }

    /// Runs the coroutine until it suspends or finishes.
    pub(crate) fn resume(&self) -> Status {
        if !self.is_alive() {
            return Status::Finished;
        }
        let context = match self.context.take() {
            Some(context) => context,
            //正在运行，不能重复恢复
            None => return self.status.get(),
        };
        self.status.set(Status::Running);
        let transfer = unsafe { context.resume(self as *const Coroutine as usize) };
        if self.is_alive() {
            self.context.set(Some(transfer.context));
        }
        self.status.get()
    }

    /// Hands control back to whoever resumed this coroutine.
    ///
    /// Must be called from inside the coroutine.
    pub(crate) fn suspend(&self) {
        if let Some(caller) = self.caller.take() {
            self.status.set(Status::Suspend);
            let transfer = unsafe { caller.resume(0) };
            self.caller.set(Some(transfer.context));
            self.status.set(Status::Running);
        }
    }

    pub(crate) fn take_outcome(&self) -> Option<Outcome> {
        self.outcome.take()
    }
}

impl Drop for Coroutine {
    fn drop(&mut self) {
        // a suspended coroutine leaks whatever its frames own
        if let Some(stack) = self.stack.take() {
            memory_pool::revert(stack);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Coroutine, Outcome, Status};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[test]
    fn runs_to_completion() {
        let hits = Rc::new(Cell::new(0));
        let inner = hits.clone();
        let coroutine = Coroutine::new(
            64 * 1024,
            Box::new(move || -> Result<(), String> {
                inner.set(inner.get() + 1);
                Ok(())
            }),
        )
        .unwrap();
        assert_eq!(Status::Created, coroutine.status());
        assert!(!coroutine.started());
        assert_eq!(Status::Finished, coroutine.resume());
        assert_eq!(1, hits.get());
        assert!(matches!(coroutine.take_outcome(), Some(Outcome::Returned)));
        //结束后再次恢复无效
        assert_eq!(Status::Finished, coroutine.resume());
        assert_eq!(1, hits.get());
    }

    #[test]
    fn suspend_and_resume() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let slot: Rc<RefCell<Option<Rc<Coroutine>>>> = Rc::new(RefCell::new(None));
        let (inner_log, inner_slot) = (log.clone(), slot.clone());
        let coroutine = Rc::new(
            Coroutine::new(
                64 * 1024,
                Box::new(move || -> Result<(), String> {
                    let me = inner_slot.borrow().clone().unwrap();
                    for i in 0..3 {
                        inner_log.borrow_mut().push(i);
                        me.suspend();
                    }
                    Ok(())
                }),
            )
            .unwrap(),
        );
        *slot.borrow_mut() = Some(coroutine.clone());
        for expected in 1..=3 {
            assert_eq!(Status::Suspend, coroutine.resume());
            assert_eq!(expected, log.borrow().len());
        }
        assert_eq!(Status::Finished, coroutine.resume());
        assert_eq!(vec![0, 1, 2], *log.borrow());
        slot.borrow_mut().take();
    }

    #[test]
    fn failure_and_panic_stay_inside() {
        let failed = Coroutine::new(
            64 * 1024,
            Box::new(|| -> Result<(), String> { Err("boom".to_string()) }),
        )
        .unwrap();
        failed.resume();
        assert!(matches!(failed.take_outcome(), Some(Outcome::Failed(msg)) if msg == "boom"));

        let panicked = Coroutine::new(
            64 * 1024,
            Box::new(|| -> Result<(), String> { panic!("kaboom") }),
        )
        .unwrap();
        assert_eq!(Status::Finished, panicked.resume());
        assert!(matches!(panicked.take_outcome(), Some(Outcome::Panicked(_))));
    }
}
