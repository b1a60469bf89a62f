use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::mem;
use std::panic;
use std::rc::{Rc, Weak};

use object_list::Handle;
use timer::TimerList;
use tracing::{debug, error, trace, warn};

use crate::channel::{Channel, Direction, Preference};
use crate::config::{Builder, Config};
use crate::coroutine::{Coroutine, Entry, Outcome, Status};
use crate::error::Error;
use crate::hook::Hooks;
use crate::rng::DetRng;
use crate::task::{Task, TaskBuilder, TaskExit, TaskId, TaskOutput};

thread_local! {
    //当前线程正在驱动任务的调度器，嵌套驱动时为栈
    static CURRENT: RefCell<Vec<Weak<Shared>>> = RefCell::new(Vec::new());
}

/// Identifies one pending channel operation of one select call.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct OpId(u64);

/// Who is waiting behind a pending operation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Waiter {
    Task(TaskId),
    /// Whatever context drives the scheduler, e.g. `main`.
    Main,
}

impl Waiter {
    pub(crate) fn task(self) -> Option<TaskId> {
        match self {
            Waiter::Task(id) => Some(id),
            Waiter::Main => None,
        }
    }
}

/// Lets the scheduler pull a pending operation out of a channel queue
/// without knowing the channel's payload type.
pub trait Withdraw {
    fn withdraw(&self, handle: Handle);
}

/// A pending operation as seen from its waiter.
pub struct Registration {
    pub(crate) op: OpId,
    pub(crate) handle: Handle,
    pub(crate) channel: Weak<dyn Withdraw>,
}

/// Counters since the scheduler was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub spawned: usize,
    /// Entry function returned normally.
    pub completed: usize,
    /// Entry function returned `Err`.
    pub failed: usize,
    pub panicked: usize,
    pub killed: usize,
    /// Number of times a task was switched in.
    pub switches: u64,
}

struct TaskEntry {
    coroutine: Rc<Coroutine>,
    label: Option<Rc<str>>,
    blocked: bool,
    //被kill后，下次恢复时展开
    killed: bool,
    registrations: Vec<Registration>,
    wake: Option<OpId>,
}

#[derive(Default)]
struct MainSlot {
    blocked: bool,
    registrations: Vec<Registration>,
    wake: Option<OpId>,
}

pub struct State {
    tasks: HashMap<TaskId, TaskEntry>,
    //可运行的任务，正在运行的任务总在队首
    runnable: VecDeque<TaskId>,
    current: Option<TaskId>,
    //上一次切入的任务
    last: Option<TaskId>,
    driving: bool,
    main: MainSlot,
    rng: DetRng,
    next_op: u64,
    pub(crate) timers: TimerList<Channel<()>>,
    pub(crate) pump: Option<TaskId>,
    stats: Stats,
}

pub struct Shared {
    config: Config,
    pub(crate) state: RefCell<State>,
    pub(crate) hooks: Hooks,
}

/// A single-threaded cooperative scheduler.
///
/// Tasks only switch at channel operations, yields, sleeps and kills. The
/// handle is cheap to clone; every clone drives the same set of tasks.
#[derive(Clone)]
pub struct Scheduler {
    pub(crate) shared: Rc<Shared>,
}

impl Scheduler {
    pub fn new() -> Self {
        Builder::new().build()
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn with_config(config: Config) -> Self {
        let state = State {
            tasks: HashMap::new(),
            runnable: VecDeque::new(),
            current: None,
            last: None,
            driving: false,
            main: MainSlot::default(),
            rng: DetRng::new(config.seed),
            next_op: 0,
            timers: TimerList::new(),
            pump: None,
            stats: Stats::default(),
        };
        Scheduler {
            shared: Rc::new(Shared {
                config,
                state: RefCell::new(state),
                hooks: Hooks::default(),
            }),
        }
    }

    pub(crate) fn from_shared(shared: Rc<Shared>) -> Self {
        Scheduler { shared }
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared> {
        Rc::downgrade(&self.shared)
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// The scheduler running the calling task, if any.
    pub fn current() -> Option<Scheduler> {
        CURRENT.with(|current| {
            current
                .borrow()
                .last()
                .and_then(Weak::upgrade)
                .map(Scheduler::from_shared)
        })
    }

    /// Binds `f` to a new task and appends it to the run queue. Nothing runs yet.
    pub fn spawn<F, R>(&self, f: F) -> Result<Task, Error>
    where
        F: FnOnce() -> R + 'static,
        R: TaskOutput,
    {
        self.task().spawn(f)
    }

    pub fn task(&self) -> TaskBuilder<'_> {
        TaskBuilder::new(self)
    }

    pub(crate) fn spawn_entry(
        &self,
        label: Option<String>,
        stack_size: Option<usize>,
        entry: Entry,
    ) -> Result<Task, Error> {
        let id = TaskId::next();
        let stack_size = stack_size.unwrap_or(self.shared.config.stack_size);
        let coroutine = Rc::new(Coroutine::new(stack_size, entry)?);
        let label: Option<Rc<str>> = label.map(Rc::from);
        {
            let mut state = self.shared.state.borrow_mut();
            state.tasks.insert(
                id,
                TaskEntry {
                    coroutine,
                    label: label.clone(),
                    blocked: false,
                    killed: false,
                    registrations: Vec::new(),
                    wake: None,
                },
            );
            state.runnable.push_back(id);
            state.stats.spawned += 1;
        }
        debug!(task = %id, label = ?label, stack_size, "spawned");
        Ok(Task::new(id, label, self.downgrade()))
    }

    /// Runs tasks until none is runnable.
    ///
    /// `Ok` when no task is left waiting on a channel: every task has ended
    /// or was taken off the run queue with [`Task::remove`](crate::Task::remove).
    /// [`Error::Deadlock`] when tasks are still blocked on channels.
    pub fn run_until_idle(&self) -> Result<(), Error> {
        if self.current_id().is_some() {
            return Err(Error::Reentrant);
        }
        while self.step()? {}
        let state = self.shared.state.borrow();
        let blocked = state.tasks.values().filter(|entry| entry.blocked).count();
        if blocked == 0 {
            debug!(
                switches = state.stats.switches,
                removed = state.tasks.len(),
                "idle"
            );
            Ok(())
        } else {
            warn!(blocked, "deadlock: every alive task is blocked");
            Err(Error::Deadlock { blocked })
        }
    }

    /// Gives the head of the run queue one turn. `Ok(false)` if nothing is runnable.
    pub fn step(&self) -> Result<bool, Error> {
        let (id, coroutine, prev) = {
            let mut state = self.shared.state.borrow_mut();
            if state.driving {
                return Err(Error::Reentrant);
            }
            let id = match state.runnable.front() {
                Some(id) => *id,
                None => return Ok(false),
            };
            let coroutine = match state.tasks.get(&id) {
                Some(entry) => entry.coroutine.clone(),
                None => {
                    state.runnable.pop_front();
                    return Err(Error::Invariant("runnable task without an entry"));
                }
            };
            state.current = Some(id);
            state.driving = true;
            state.stats.switches += 1;
            let prev = state.last.replace(id);
            (id, coroutine, prev)
        };
        if prev != Some(id) {
            self.shared.hooks.on_switch(prev, id);
        }
        trace!(task = %id, "switch in");
        CURRENT.with(|current| current.borrow_mut().push(self.downgrade()));
        let status = coroutine.resume();
        CURRENT.with(|current| current.borrow_mut().pop());
        {
            let mut state = self.shared.state.borrow_mut();
            state.current = None;
            state.driving = false;
        }
        trace!(task = %id, ?status, "switch out");
        if status == Status::Finished {
            self.finish(id, &coroutine);
        }
        Ok(true)
    }

    fn finish(&self, id: TaskId, coroutine: &Coroutine) {
        let outcome = coroutine.take_outcome();
        let entry = {
            let mut state = self.shared.state.borrow_mut();
            state.runnable.retain(|task| *task != id);
            if state.pump == Some(id) {
                state.pump = None;
            }
            match &outcome {
                Some(Outcome::Returned) | None => state.stats.completed += 1,
                Some(Outcome::Failed(_)) => state.stats.failed += 1,
                Some(Outcome::Panicked(payload)) if payload.is::<TaskExit>() => {
                    state.stats.killed += 1
                }
                Some(Outcome::Panicked(_)) => state.stats.panicked += 1,
            }
            state.tasks.remove(&id)
        };
        let label = entry.as_ref().and_then(|entry| entry.label.clone());
        match outcome {
            Some(Outcome::Returned) | None => debug!(task = %id, label = ?label, "finished"),
            Some(Outcome::Failed(err)) => {
                warn!(task = %id, label = ?label, error = %err, "task failed")
            }
            Some(Outcome::Panicked(payload)) if payload.is::<TaskExit>() => {
                debug!(task = %id, label = ?label, "killed")
            }
            Some(Outcome::Panicked(payload)) => {
                error!(task = %id, label = ?label, panic = %panic_message(&payload), "task panicked")
            }
        }
        if let Some(mut entry) = entry {
            withdraw_all(mem::take(&mut entry.registrations), None);
        }
    }

    /// Lets other tasks run.
    ///
    /// Inside a task: moves it to the back of the run queue and switches.
    /// From the main context: gives every currently runnable task one turn,
    /// or [`Error::NoRunnable`] if there is none.
    pub fn yield_now(&self) -> Result<(), Error> {
        match self.current_id() {
            Some(id) => {
                self.rotate(id);
                self.suspend_current(id);
                Ok(())
            }
            None => {
                if self.run_count() == 0 {
                    return Err(Error::NoRunnable);
                }
                self.run_round()
            }
        }
    }

    fn run_round(&self) -> Result<(), Error> {
        let turns = self.run_count();
        for _ in 0..turns {
            if !self.step()? {
                break;
            }
        }
        Ok(())
    }

    fn rotate(&self, id: TaskId) {
        let mut state = self.shared.state.borrow_mut();
        state.runnable.retain(|task| *task != id);
        state.runnable.push_back(id);
    }

    /// Switches from the running task `id` back to the scheduler loop.
    fn suspend_current(&self, id: TaskId) {
        let coroutine = match self.shared.state.borrow().tasks.get(&id) {
            Some(entry) => Rc::as_ptr(&entry.coroutine),
            None => return,
        };
        // step() holds an Rc to the running coroutine until it switches back
        unsafe { (*coroutine).suspend() };
        let killed = {
            let mut state = self.shared.state.borrow_mut();
            state
                .tasks
                .get_mut(&id)
                .map_or(false, |entry| mem::take(&mut entry.killed))
        };
        if killed {
            trace!(task = %id, "unwinding");
            panic::resume_unwind(Box::new(TaskExit));
        }
    }

    fn block_current(&self, id: TaskId) {
        {
            let mut state = self.shared.state.borrow_mut();
            if let Some(entry) = state.tasks.get_mut(&id) {
                entry.blocked = true;
            }
            state.runnable.retain(|task| *task != id);
        }
        trace!(task = %id, "blocked");
        self.suspend_current(id);
    }

    /// Drives tasks until the main context's pending operation resolves.
    fn block_main(&self) -> Result<(), Error> {
        self.shared.state.borrow_mut().main.blocked = true;
        loop {
            if !self.shared.state.borrow().main.blocked {
                return Ok(());
            }
            match self.step() {
                Ok(true) => {}
                Ok(false) => {
                    let blocked = self.abandon_main();
                    warn!(blocked, "deadlock: main context waits on a channel nobody serves");
                    return Err(Error::Deadlock { blocked });
                }
                Err(err) => {
                    self.abandon_main();
                    return Err(err);
                }
            }
        }
    }

    fn abandon_main(&self) -> usize {
        let (registrations, blocked) = {
            let mut state = self.shared.state.borrow_mut();
            state.main.blocked = false;
            state.main.wake = None;
            let registrations = mem::take(&mut state.main.registrations);
            let blocked = state.tasks.values().filter(|entry| entry.blocked).count();
            (registrations, blocked)
        };
        withdraw_all(registrations, None);
        blocked
    }

    pub(crate) fn block(&self, waiter: Waiter) -> Result<(), Error> {
        match waiter {
            Waiter::Task(id) => {
                self.block_current(id);
                Ok(())
            }
            Waiter::Main => self.block_main(),
        }
    }

    pub(crate) fn register(&self, waiter: Waiter, registrations: Vec<Registration>) {
        let mut state = self.shared.state.borrow_mut();
        match waiter {
            Waiter::Task(id) => {
                if let Some(entry) = state.tasks.get_mut(&id) {
                    entry.wake = None;
                    entry.registrations.extend(registrations);
                }
            }
            Waiter::Main => {
                state.main.wake = None;
                state.main.registrations.extend(registrations);
            }
        }
    }

    pub(crate) fn take_wake(&self, waiter: Waiter) -> Option<OpId> {
        let mut state = self.shared.state.borrow_mut();
        match waiter {
            Waiter::Task(id) => state.tasks.get_mut(&id).and_then(|entry| entry.wake.take()),
            Waiter::Main => state.main.wake.take(),
        }
    }

    /// Marks `waiter` as satisfied by `op` and withdraws all its other
    /// pending operations before anything else can run.
    fn wake(&self, waiter: Waiter, op: OpId) -> Result<(), Error> {
        let registrations = {
            let mut state = self.shared.state.borrow_mut();
            match waiter {
                Waiter::Task(id) => {
                    let entry = state
                        .tasks
                        .get_mut(&id)
                        .ok_or(Error::Invariant("woke a task that is gone"))?;
                    entry.blocked = false;
                    entry.wake = Some(op);
                    mem::take(&mut entry.registrations)
                }
                Waiter::Main => {
                    state.main.blocked = false;
                    state.main.wake = Some(op);
                    mem::take(&mut state.main.registrations)
                }
            }
        };
        withdraw_all(registrations, Some(op));
        Ok(())
    }

    /// Wakes `peer` after the running side completed `op` against it, then
    /// decides who runs next.
    pub(crate) fn after_rendezvous(
        &self,
        peer: Waiter,
        op: OpId,
        initiator: Direction,
        preference: Preference,
        schedule_all: bool,
    ) -> Result<(), Error> {
        self.wake(peer, op)?;
        let me = self.current_waiter();
        trace!(?me, ?peer, ?preference, schedule_all, "rendezvous");
        if schedule_all || preference == Preference::Neutral {
            self.push_back(peer);
            return match me {
                Waiter::Task(id) => {
                    self.rotate(id);
                    self.suspend_current(id);
                    Ok(())
                }
                Waiter::Main => self.run_round(),
            };
        }
        if !preference.favors(initiator.opposite()) {
            self.push_back(peer);
            return Ok(());
        }
        //对端优先：立刻切换到对端，之后回到自己
        match (me, peer) {
            (Waiter::Task(me), Waiter::Task(peer)) => {
                self.shared.state.borrow_mut().runnable.push_front(peer);
                self.suspend_current(me);
            }
            (Waiter::Task(me), Waiter::Main) => self.suspend_current(me),
            (Waiter::Main, Waiter::Task(peer)) => {
                self.shared.state.borrow_mut().runnable.push_front(peer);
                self.step()?;
            }
            (Waiter::Main, Waiter::Main) => {
                return Err(Error::Invariant("main context met itself on a channel"))
            }
        }
        Ok(())
    }

    fn push_back(&self, waiter: Waiter) {
        if let Waiter::Task(id) = waiter {
            self.shared.state.borrow_mut().runnable.push_back(id);
        }
    }

    pub(crate) fn kill(&self, id: TaskId) -> Result<(), Error> {
        let me = self.current_id();
        if me == Some(id) {
            debug!(task = %id, "task kills itself");
            panic::resume_unwind(Box::new(TaskExit));
        }
        enum Victim {
            Gone,
            Unstarted(Option<TaskEntry>),
            Suspended(Vec<Registration>),
        }
        let victim = {
            let mut state = self.shared.state.borrow_mut();
            let started = state.tasks.get(&id).map(|entry| entry.coroutine.started());
            match started {
                None => Victim::Gone,
                Some(false) => {
                    state.runnable.retain(|task| *task != id);
                    if state.pump == Some(id) {
                        state.pump = None;
                    }
                    state.stats.killed += 1;
                    Victim::Unstarted(state.tasks.remove(&id))
                }
                Some(true) => {
                    let registrations = match state.tasks.get_mut(&id) {
                        Some(entry) => {
                            entry.blocked = false;
                            entry.killed = true;
                            entry.wake = None;
                            mem::take(&mut entry.registrations)
                        }
                        None => Vec::new(),
                    };
                    state.runnable.retain(|task| *task != id);
                    state.runnable.push_front(id);
                    Victim::Suspended(registrations)
                }
            }
        };
        match victim {
            Victim::Gone => Ok(()),
            Victim::Unstarted(entry) => {
                debug!(task = %id, "killed before it ran");
                drop(entry);
                Ok(())
            }
            Victim::Suspended(registrations) => {
                withdraw_all(registrations, None);
                debug!(task = %id, "killing");
                match me {
                    Some(me) => {
                        self.suspend_current(me);
                        Ok(())
                    }
                    None => self.step().map(|_| ()),
                }
            }
        }
    }

    /// Kills every task, the calling one last.
    pub fn kill_all(&self) -> Result<(), Error> {
        let me = self.current_id();
        let mut victims: Vec<TaskId> = self
            .shared
            .state
            .borrow()
            .tasks
            .keys()
            .copied()
            .filter(|id| Some(*id) != me)
            .collect();
        victims.sort();
        for id in victims {
            self.kill(id)?;
        }
        if let Some(me) = me {
            self.kill(me)?;
        }
        Ok(())
    }

    /// Takes a task off the run queue without ending it. Removing a dead task
    /// does nothing.
    pub(crate) fn remove_task(&self, id: TaskId) -> Result<(), Error> {
        if self.current_id() == Some(id) {
            return Err(Error::CurrentTask(id));
        }
        let mut state = self.shared.state.borrow_mut();
        match state.tasks.get(&id) {
            None => Ok(()),
            Some(entry) if entry.blocked => Err(Error::Blocked(id)),
            Some(_) => {
                state.runnable.retain(|task| *task != id);
                debug!(task = %id, "removed from the run queue");
                Ok(())
            }
        }
    }

    /// Appends a task to the run queue unless it is already there.
    pub(crate) fn insert_task(&self, id: TaskId) -> Result<(), Error> {
        let mut state = self.shared.state.borrow_mut();
        match state.tasks.get(&id) {
            None => Err(Error::Dead(id)),
            Some(entry) if entry.blocked => Err(Error::Blocked(id)),
            Some(_) => {
                if !state.runnable.contains(&id) {
                    state.runnable.push_back(id);
                    debug!(task = %id, "inserted into the run queue");
                }
                Ok(())
            }
        }
    }

    /// Switches into a task right away; the caller continues after it.
    pub(crate) fn run_task(&self, id: TaskId) -> Result<(), Error> {
        let me = self.current_id();
        if me == Some(id) {
            return Ok(());
        }
        self.insert_task(id)?;
        {
            let mut state = self.shared.state.borrow_mut();
            state.runnable.retain(|task| *task != id);
            state.runnable.push_front(id);
        }
        match me {
            Some(me) => {
                self.suspend_current(me);
                Ok(())
            }
            None => self.step().map(|_| ()),
        }
    }

    pub(crate) fn task_alive(&self, id: TaskId) -> bool {
        self.shared.state.borrow().tasks.contains_key(&id)
    }

    pub(crate) fn task_blocked(&self, id: TaskId) -> bool {
        self.shared
            .state
            .borrow()
            .tasks
            .get(&id)
            .map_or(false, |entry| entry.blocked)
    }

    pub(crate) fn current_id(&self) -> Option<TaskId> {
        self.shared.state.borrow().current
    }

    pub(crate) fn current_waiter(&self) -> Waiter {
        self.current_id().map_or(Waiter::Main, Waiter::Task)
    }

    /// The task currently running on this scheduler.
    pub fn current_task(&self) -> Option<Task> {
        let state = self.shared.state.borrow();
        let id = state.current?;
        let label = state.tasks.get(&id).and_then(|entry| entry.label.clone());
        Some(Task::new(id, label, self.downgrade()))
    }

    /// Number of runnable tasks, the running one included.
    pub fn run_count(&self) -> usize {
        self.shared.state.borrow().runnable.len()
    }

    /// Number of tasks that have not ended.
    pub fn alive_count(&self) -> usize {
        self.shared.state.borrow().tasks.len()
    }

    pub fn blocked_count(&self) -> usize {
        self.shared
            .state
            .borrow()
            .tasks
            .values()
            .filter(|entry| entry.blocked)
            .count()
    }

    pub fn stats(&self) -> Stats {
        self.shared.state.borrow().stats
    }

    pub(crate) fn next_op(&self) -> OpId {
        let mut state = self.shared.state.borrow_mut();
        state.next_op += 1;
        OpId(state.next_op)
    }

    pub(crate) fn random_below(&self, bound: usize) -> usize {
        self.shared.state.borrow_mut().rng.next_usize(bound)
    }

    pub(crate) fn is(&self, shared: &Rc<Shared>) -> bool {
        Rc::ptr_eq(&self.shared, shared)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Scheduler");
        if let Ok(state) = self.shared.state.try_borrow() {
            debug
                .field("alive", &state.tasks.len())
                .field("runnable", &state.runnable.len())
                .field("current", &state.current);
        }
        debug.finish()
    }
}

fn withdraw_all(registrations: Vec<Registration>, keep: Option<OpId>) {
    for registration in registrations {
        if Some(registration.op) == keep {
            continue;
        }
        if let Some(channel) = registration.channel.upgrade() {
            channel.withdraw(registration.handle);
        }
    }
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
