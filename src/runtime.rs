//! Cooperative single-threaded scheduler.
//!
//! Everything in this crate runs on one logical thread. The [`Runtime`] owns
//! the only deliberate suspension points the engine has:
//!
//! - a microtask queue, drained at the end of the current synchronous task
//!   (batched `dataChange` emission, coalesced renders, singleton sweeps),
//! - virtual-clock timers (debounced validation, deferred slot deletion),
//! - a local futures executor for asynchronous validators and loads.
//!
//! The clock never moves on its own. Hosts call [`Runtime::advance`] from
//! their tick loop; tests do the same, which keeps every scenario
//! deterministic.
//!
//! The runtime is also the injected container for the registries that would
//! otherwise be hidden process-wide state: the default error formatter and
//! the singleton arena. Two runtimes never share state.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;

use crate::config::EngineConfig;
use crate::form::validation::ErrorFormatter;
use crate::hooks::singleton::{SingletonRegistry, SingletonState};

type Job = Box<dyn FnOnce()>;

/// Handle returned by [`Runtime::set_timeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Defaults the engine falls back to when a form, field or view does not
/// override them.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    /// Delay between a data change and the validation it triggers.
    pub validation_debounce: Duration,
    /// Whether data changes trigger validation at all.
    pub validate_on_change: bool,
    /// Whether the host double-invokes setup/teardown pairs.
    pub strict: bool,
    /// Page size given to new data views.
    pub default_page_size: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            validation_debounce: Duration::from_millis(300),
            validate_on_change: true,
            strict: false,
            default_page_size: 20,
        }
    }
}

impl From<&EngineConfig> for RuntimeSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            validation_debounce: Duration::from_millis(config.validation.debounce_ms),
            validate_on_change: config.validation.validate_on_change,
            strict: config.lifecycle.strict,
            default_page_size: config.data_view.default_page_size,
        }
    }
}

/// The result of work spawned on the runtime executor.
///
/// Dropping a `Task` does not cancel the work.
pub struct Task<T> {
    receiver: oneshot::Receiver<T>,
    value: Option<T>,
}

impl<T> Task<T> {
    /// Take the result if the work has finished.
    pub fn try_take(&mut self) -> Option<T> {
        if let Some(value) = self.value.take() {
            return Some(value);
        }
        self.receiver.try_recv().ok().flatten()
    }

    /// Whether the result is available.
    pub fn is_finished(&mut self) -> bool {
        if self.value.is_none() {
            self.value = self.receiver.try_recv().ok().flatten();
        }
        self.value.is_some()
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("ready", &self.value.is_some())
            .finish()
    }
}

/// Shared handle to the scheduler. Cloning is cheap.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

struct RuntimeInner {
    microtasks: RefCell<VecDeque<Job>>,
    timers: RefCell<BTreeMap<(Duration, TimerId), Job>>,
    next_timer: Cell<u64>,
    now: Cell<Duration>,
    pool: RefCell<LocalPool>,
    spawner: LocalSpawner,
    draining: Cell<bool>,
    settings: RefCell<RuntimeSettings>,
    default_formatter: RefCell<Option<ErrorFormatter>>,
    singletons: Rc<RefCell<SingletonState>>,
}

impl Runtime {
    /// Create a runtime with default settings.
    pub fn new() -> Self {
        Self::with_settings(RuntimeSettings::default())
    }

    /// Create a runtime whose defaults come from a loaded configuration.
    pub fn with_config(config: &EngineConfig) -> Self {
        Self::with_settings(RuntimeSettings::from(config))
    }

    pub fn with_settings(settings: RuntimeSettings) -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            inner: Rc::new(RuntimeInner {
                microtasks: RefCell::new(VecDeque::new()),
                timers: RefCell::new(BTreeMap::new()),
                next_timer: Cell::new(0),
                now: Cell::new(Duration::ZERO),
                pool: RefCell::new(pool),
                spawner,
                draining: Cell::new(false),
                settings: RefCell::new(settings),
                default_formatter: RefCell::new(None),
                singletons: Rc::new(RefCell::new(SingletonState::default())),
            }),
        }
    }

    pub fn settings(&self) -> RuntimeSettings {
        self.inner.settings.borrow().clone()
    }

    pub fn update_settings(&self, f: impl FnOnce(&mut RuntimeSettings)) {
        f(&mut self.inner.settings.borrow_mut());
    }

    /// Current virtual time, measured from runtime creation.
    pub fn now(&self) -> Duration {
        self.inner.now.get()
    }

    /// Queue a job to run once the current synchronous task completes.
    pub fn queue_microtask(&self, job: impl FnOnce() + 'static) {
        self.inner.microtasks.borrow_mut().push_back(Box::new(job));
    }

    pub fn pending_microtasks(&self) -> usize {
        self.inner.microtasks.borrow().len()
    }

    /// Run `job` once the virtual clock has moved `delay` past now.
    pub fn set_timeout(&self, delay: Duration, job: impl FnOnce() + 'static) -> TimerId {
        let id = TimerId(self.inner.next_timer.get());
        self.inner.next_timer.set(id.0 + 1);
        let deadline = self.now() + delay;
        self.inner
            .timers
            .borrow_mut()
            .insert((deadline, id), Box::new(job));
        id
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn clear_timeout(&self, id: TimerId) -> bool {
        let mut timers = self.inner.timers.borrow_mut();
        let before = timers.len();
        timers.retain(|(_, timer), _| *timer != id);
        timers.len() != before
    }

    pub fn pending_timers(&self) -> usize {
        self.inner.timers.borrow().len()
    }

    /// Spawn a future on the local executor.
    ///
    /// The future makes progress only while the runtime is being driven by
    /// [`run_until_idle`](Self::run_until_idle) or [`advance`](Self::advance).
    pub fn spawn<R: 'static>(&self, future: impl Future<Output = R> + 'static) -> Task<R> {
        let (sender, receiver) = oneshot::channel();
        let spawned = self.inner.spawner.spawn_local(async move {
            let result = future.await;
            let _ = sender.send(result);
        });
        if let Err(error) = spawned {
            tracing::warn!(%error, "runtime executor rejected a task");
        }
        Task {
            receiver,
            value: None,
        }
    }

    /// Spawn `future`, drive the runtime until idle, and return the output
    /// if the future finished without waiting on the clock or on an
    /// external event.
    pub fn resolve<R: 'static>(&self, future: impl Future<Output = R> + 'static) -> Option<R> {
        let mut task = self.spawn(future);
        self.run_until_idle();
        task.try_take()
    }

    /// Drain microtasks, executor work and timers that are already due.
    ///
    /// Re-entrant calls (from inside a job) return immediately; the outer
    /// drain picks up whatever they would have run.
    pub fn run_until_idle(&self) {
        if self.inner.draining.replace(true) {
            return;
        }
        let inner = Rc::clone(&self.inner);
        let _reset = scopeguard::guard((), move |_| inner.draining.set(false));

        loop {
            while let Some(job) = self.pop_microtask() {
                job();
            }
            self.inner.pool.borrow_mut().run_until_stalled();
            if self.pending_microtasks() > 0 {
                continue;
            }
            match self.pop_due_timer() {
                Some(job) => job(),
                None => break,
            }
        }
    }

    /// Move the virtual clock forward, firing timers in deadline order.
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        loop {
            self.run_until_idle();
            let next = self
                .inner
                .timers
                .borrow()
                .keys()
                .next()
                .map(|(deadline, _)| *deadline);
            match next {
                Some(deadline) if deadline <= target => self.inner.now.set(deadline),
                _ => break,
            }
        }
        self.inner.now.set(target);
        self.run_until_idle();
    }

    fn pop_microtask(&self) -> Option<Job> {
        self.inner.microtasks.borrow_mut().pop_front()
    }

    fn pop_due_timer(&self) -> Option<Job> {
        let mut timers = self.inner.timers.borrow_mut();
        let key = *timers.keys().next()?;
        if key.0 > self.now() {
            return None;
        }
        timers.remove(&key)
    }

    /// Install the formatter consulted after field- and form-level
    /// formatters decline to format a validation error.
    pub fn set_default_error_formatter(&self, formatter: Option<ErrorFormatter>) {
        *self.inner.default_formatter.borrow_mut() = formatter;
    }

    pub fn default_error_formatter(&self) -> Option<ErrorFormatter> {
        self.inner.default_formatter.borrow().clone()
    }

    /// The singleton arena owned by this runtime.
    pub fn singletons(&self) -> SingletonRegistry {
        SingletonRegistry::from_parts(self.clone(), Rc::clone(&self.inner.singletons))
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("now", &self.now())
            .field("microtasks", &self.pending_microtasks())
            .field("timers", &self.pending_timers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microtasks_run_in_fifo_order() {
        let rt = Runtime::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = Rc::clone(&log);
            rt.queue_microtask(move || log.borrow_mut().push(i));
        }
        assert!(log.borrow().is_empty());
        rt.run_until_idle();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn microtask_queued_from_microtask_runs_in_same_drain() {
        let rt = Runtime::new();
        let hits = Rc::new(Cell::new(0));
        let inner_rt = rt.clone();
        let h = Rc::clone(&hits);
        rt.queue_microtask(move || {
            let h2 = Rc::clone(&h);
            inner_rt.queue_microtask(move || h2.set(h2.get() + 10));
            h.set(h.get() + 1);
        });
        rt.run_until_idle();
        assert_eq!(hits.get(), 11);
    }

    #[test]
    fn timers_fire_only_when_clock_advances() {
        let rt = Runtime::new();
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        rt.set_timeout(Duration::from_millis(100), move || f.set(true));

        rt.run_until_idle();
        assert!(!fired.get());
        rt.advance(Duration::from_millis(99));
        assert!(!fired.get());
        rt.advance(Duration::from_millis(1));
        assert!(fired.get());
        assert_eq!(rt.now(), Duration::from_millis(100));
    }

    #[test]
    fn zero_delay_timer_runs_on_idle() {
        let rt = Runtime::new();
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        rt.set_timeout(Duration::ZERO, move || f.set(true));
        rt.run_until_idle();
        assert!(fired.get());
    }

    #[test]
    fn cleared_timer_never_fires() {
        let rt = Runtime::new();
        let fired = Rc::new(Cell::new(false));
        let f = Rc::clone(&fired);
        let id = rt.set_timeout(Duration::from_millis(5), move || f.set(true));
        assert!(rt.clear_timeout(id));
        assert!(!rt.clear_timeout(id));
        rt.advance(Duration::from_millis(10));
        assert!(!fired.get());
    }

    #[test]
    fn timers_fire_in_deadline_order() {
        let rt = Runtime::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (delay, tag) in [(30, "c"), (10, "a"), (20, "b")] {
            let log = Rc::clone(&log);
            rt.set_timeout(Duration::from_millis(delay), move || log.borrow_mut().push(tag));
        }
        rt.advance(Duration::from_millis(50));
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn spawned_future_requires_driving() {
        let rt = Runtime::new();
        let mut task = rt.spawn(async { 11 });
        assert_eq!(task.try_take(), None);
        rt.run_until_idle();
        assert_eq!(task.try_take(), Some(11));
    }

    #[test]
    fn resolve_returns_none_while_waiting_on_external_event() {
        let rt = Runtime::new();
        let (tx, rx) = oneshot::channel::<u8>();
        assert_eq!(rt.resolve(async move { rx.await.ok() }), None);
        drop(tx);
        assert_eq!(rt.resolve(async { 3 }), Some(3));
    }

    #[test]
    fn settings_follow_config() {
        let mut config = EngineConfig::default();
        config.validation.debounce_ms = 50;
        config.lifecycle.strict = true;
        let rt = Runtime::with_config(&config);
        let settings = rt.settings();
        assert_eq!(settings.validation_debounce, Duration::from_millis(50));
        assert!(settings.strict);
    }
}
