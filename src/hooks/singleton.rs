//! Exactly-once finalisation for long-lived instances.
//!
//! Hosts running in strict mode invoke setup twice for one logical mount and
//! run teardown once per invocation. The registry tolerates that with a
//! per-instance disposal intent:
//!
//! - [`materialize`](SingletonRegistry::materialize) registers an instance
//!   as `Soft` and schedules a sweep, so an instance that is never committed
//!   (the discarded half of a double invocation) still gets finalised.
//! - [`keep`](SingletonRegistry::keep) marks it live (`None`).
//! - [`release`](SingletonRegistry::release) marks it `Soft` and schedules a
//!   sweep in strict mode, or finalises it right away (`Hard`) otherwise.
//! - The sweep runs as a microtask and finalises every instance still marked
//!   for disposal. Anything re-kept in between survives.
//!
//! A finalised instance has its disposer called exactly once and stays in
//! the disposed set for the lifetime of the runtime.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::hooks::scope::Scope;
use crate::runtime::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SingletonId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeIntent {
    None,
    Soft,
    Hard,
}

struct Entry {
    intent: DisposeIntent,
    dispose: Option<Box<dyn FnOnce()>>,
}

/// Arena backing a [`SingletonRegistry`]. Owned by the [`Runtime`].
#[derive(Default)]
pub struct SingletonState {
    entries: HashMap<SingletonId, Entry>,
    disposed: HashSet<SingletonId>,
    next: u64,
    sweep_scheduled: bool,
}

/// Handle to a runtime's singleton arena. Cloning is cheap.
#[derive(Clone)]
pub struct SingletonRegistry {
    runtime: Runtime,
    state: Rc<RefCell<SingletonState>>,
}

impl SingletonRegistry {
    pub fn new(runtime: &Runtime) -> Self {
        runtime.singletons()
    }

    pub(crate) fn from_parts(runtime: Runtime, state: Rc<RefCell<SingletonState>>) -> Self {
        Self { runtime, state }
    }

    /// Register a new instance with its disposer.
    pub fn materialize(&self, dispose: impl FnOnce() + 'static) -> SingletonId {
        let id = {
            let mut state = self.state.borrow_mut();
            let id = SingletonId(state.next);
            state.next += 1;
            state.entries.insert(
                id,
                Entry {
                    intent: DisposeIntent::Soft,
                    dispose: Some(Box::new(dispose)),
                },
            );
            id
        };
        self.schedule_sweep();
        id
    }

    /// Mark `id` as live. Returns false if it is unknown or already finalised.
    pub fn keep(&self, id: SingletonId) -> bool {
        match self.state.borrow_mut().entries.get_mut(&id) {
            Some(entry) => {
                entry.intent = DisposeIntent::None;
                true
            }
            None => false,
        }
    }

    pub fn release(&self, id: SingletonId, strict: bool) {
        if strict {
            if let Some(entry) = self.state.borrow_mut().entries.get_mut(&id) {
                entry.intent = DisposeIntent::Soft;
            }
            self.schedule_sweep();
        } else {
            if let Some(entry) = self.state.borrow_mut().entries.get_mut(&id) {
                entry.intent = DisposeIntent::Hard;
            }
            self.finalize(id);
        }
    }

    pub fn intent(&self, id: SingletonId) -> Option<DisposeIntent> {
        self.state.borrow().entries.get(&id).map(|entry| entry.intent)
    }

    /// Finalise every instance still marked for disposal.
    pub fn sweep(&self) {
        let doomed: Vec<SingletonId> = {
            let mut state = self.state.borrow_mut();
            state.sweep_scheduled = false;
            state
                .entries
                .iter()
                .filter(|(_, entry)| entry.intent != DisposeIntent::None)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in doomed {
            self.finalize(id);
        }
    }

    fn finalize(&self, id: SingletonId) {
        let dispose = {
            let mut state = self.state.borrow_mut();
            let Some(mut entry) = state.entries.remove(&id) else {
                return;
            };
            state.disposed.insert(id);
            entry.dispose.take()
        };
        tracing::debug!(singleton = id.0, "singleton finalised");
        if let Some(dispose) = dispose {
            dispose();
        }
    }

    fn schedule_sweep(&self) {
        {
            let mut state = self.state.borrow_mut();
            if state.sweep_scheduled {
                return;
            }
            state.sweep_scheduled = true;
        }
        let registry = self.clone();
        self.runtime.queue_microtask(move || registry.sweep());
    }

    pub fn is_disposed(&self, id: SingletonId) -> bool {
        self.state.borrow().disposed.contains(&id)
    }

    /// Instances registered and not yet finalised.
    pub fn live_count(&self) -> usize {
        self.state.borrow().entries.len()
    }
}

impl fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("SingletonRegistry")
            .field("live", &state.entries.len())
            .field("disposed", &state.disposed.len())
            .finish()
    }
}

/// Whether the instance `id` on `runtime` has been finalised.
pub fn is_singleton_disposed(runtime: &Runtime, id: SingletonId) -> bool {
    runtime.singletons().is_disposed(id)
}

/// One logical long-lived instance.
pub struct Singleton<T> {
    instance: Rc<T>,
    id: SingletonId,
    registry: SingletonRegistry,
}

impl<T> Singleton<T> {
    pub fn id(&self) -> SingletonId {
        self.id
    }

    pub fn instance(&self) -> Rc<T> {
        Rc::clone(&self.instance)
    }

    /// Mark the instance kept by a render commit.
    pub fn commit(&self) -> bool {
        self.registry.keep(self.id)
    }

    pub fn release(&self, strict: bool) {
        self.registry.release(self.id, strict);
    }

    pub fn is_disposed(&self) -> bool {
        self.registry.is_disposed(self.id)
    }
}

impl<T> Clone for Singleton<T> {
    fn clone(&self) -> Self {
        Self {
            instance: Rc::clone(&self.instance),
            id: self.id,
            registry: self.registry.clone(),
        }
    }
}

impl<T> Deref for Singleton<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.instance
    }
}

impl<T: fmt::Debug> fmt::Debug for Singleton<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Singleton")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .finish()
    }
}

fn materialize_instance<T: 'static>(
    registry: &SingletonRegistry,
    factory: &dyn Fn() -> T,
    on_dispose: &Rc<dyn Fn(&T)>,
) -> Singleton<T> {
    let instance = Rc::new(factory());
    let held = Rc::clone(&instance);
    let on_dispose = Rc::clone(on_dispose);
    let id = registry.materialize(move || on_dispose(&held));
    Singleton {
        instance,
        id,
        registry: registry.clone(),
    }
}

/// The instance owned by `scope`, created on its first render.
///
/// In strict scopes setup is invoked twice and the mount effect runs
/// keep, release, keep, the way a double-invoking host would drive it. The
/// discarded first instance is finalised by the next sweep. `on_dispose`
/// runs exactly once per instance, after its final release. Later renders
/// return the same instance.
pub fn use_singleton<T: 'static>(
    scope: &Scope,
    factory: impl Fn() -> T,
    on_dispose: impl Fn(&T) + 'static,
) -> Singleton<T> {
    let singleton = scope.memo(|| mount_singleton(scope, factory, on_dispose));
    (*singleton).clone()
}

fn mount_singleton<T: 'static>(
    scope: &Scope,
    factory: impl Fn() -> T,
    on_dispose: impl Fn(&T) + 'static,
) -> Singleton<T> {
    let registry = scope.runtime().singletons();
    let on_dispose: Rc<dyn Fn(&T)> = Rc::new(on_dispose);
    let strict = scope.is_strict();

    let singleton = if strict {
        let _discarded = materialize_instance(&registry, &factory, &on_dispose);
        let kept = materialize_instance(&registry, &factory, &on_dispose);
        kept.commit();
        kept.release(true);
        kept.commit();
        kept
    } else {
        let kept = materialize_instance(&registry, &factory, &on_dispose);
        kept.commit();
        kept
    };

    let owned = singleton.clone();
    scope.on_unmount(move || owned.release(strict));
    singleton
}
