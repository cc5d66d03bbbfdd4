//! Provide/consume container outside the component tree.
//!
//! Consumers see the value of the most recently registered provider that is
//! still active, or the default when none is. Unregistering a provider falls
//! back to the previous one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::hooks::observable::{Observable, Subscription};
use crate::hooks::same::SameValue;
use crate::hooks::scope::Scope;

/// A value broadcast from providers to consumers.
pub struct Dependency<T> {
    inner: Rc<DependencyInner<T>>,
}

struct DependencyInner<T> {
    default: T,
    providers: RefCell<Vec<(u64, T)>>,
    next_id: Cell<u64>,
    current: Observable<T>,
}

impl<T> Clone for Dependency<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

pub fn create_dependency<T: Clone + SameValue + 'static>(default: T) -> Dependency<T> {
    Dependency {
        inner: Rc::new(DependencyInner {
            current: Observable::new(default.clone()),
            default,
            providers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }),
    }
}

impl<T: Clone + SameValue + 'static> Dependency<T> {
    /// Register a provider holding `value`. It wins over every earlier one.
    pub fn provide(&self, value: T) -> Provider<T> {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.providers.borrow_mut().push((id, value));
        self.refresh();
        Provider {
            inner: Rc::new(ProviderInner {
                dependency: self.clone(),
                id,
                active: Cell::new(true),
            }),
        }
    }

    #[must_use]
    pub fn get(&self) -> T {
        self.inner.current.get()
    }

    /// Notify `callback(new, old)` whenever the visible value changes.
    pub fn watch(&self, callback: impl Fn(&T, &T) + 'static) -> Subscription {
        self.inner.current.watch(callback)
    }

    pub fn provider_count(&self) -> usize {
        self.inner.providers.borrow().len()
    }

    fn refresh(&self) {
        let visible = self
            .inner
            .providers
            .borrow()
            .last()
            .map(|(_, value)| value.clone())
            .unwrap_or_else(|| self.inner.default.clone());
        self.inner.current.set(visible);
    }

    fn update_provider(&self, id: u64, value: T) {
        if let Some(slot) = self
            .inner
            .providers
            .borrow_mut()
            .iter_mut()
            .find(|(entry, _)| *entry == id)
        {
            slot.1 = value;
        }
        self.refresh();
    }

    fn remove_provider(&self, id: u64) {
        self.inner
            .providers
            .borrow_mut()
            .retain(|(entry, _)| *entry != id);
        self.refresh();
    }
}

impl<T: fmt::Debug> fmt::Debug for Dependency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("current", &self.inner.current)
            .field("providers", &self.inner.providers.borrow().len())
            .finish()
    }
}

/// An active provider registration.
///
/// Dropping the last clone unregisters it.
pub struct Provider<T: Clone + SameValue + 'static> {
    inner: Rc<ProviderInner<T>>,
}

struct ProviderInner<T: Clone + SameValue + 'static> {
    dependency: Dependency<T>,
    id: u64,
    active: Cell<bool>,
}

impl<T: Clone + SameValue + 'static> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone + SameValue + 'static> Provider<T> {
    /// Replace the provided value.
    pub fn set(&self, value: T) {
        if self.inner.active.get() {
            self.inner.dependency.update_provider(self.inner.id, value);
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn unregister(&self) {
        self.inner.unregister();
    }
}

impl<T: Clone + SameValue + 'static> ProviderInner<T> {
    fn unregister(&self) {
        if self.active.replace(false) {
            self.dependency.remove_provider(self.id);
        }
    }
}

impl<T: Clone + SameValue + 'static> Drop for ProviderInner<T> {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Consume `dependency` from `scope`, re-rendering it on change.
pub fn use_dependency<T: Clone + SameValue + 'static>(
    scope: &Scope,
    dependency: &Dependency<T>,
) -> Dependency<T> {
    let watched = scope.memo(|| {
        let trigger = scope.trigger().clone();
        scope.hold(dependency.watch(move |_, _| trigger.schedule()));
        dependency.clone()
    });
    (*watched).clone()
}

/// Provide `value` from `scope` until it unmounts. Later renders update
/// the same registration.
pub fn provide_dependency<T: Clone + SameValue + 'static>(
    scope: &Scope,
    dependency: &Dependency<T>,
    value: T,
) -> Provider<T> {
    let provider = scope.memo(|| {
        let provider = dependency.provide(value.clone());
        let owned = provider.clone();
        scope.on_unmount(move || owned.unregister());
        provider
    });
    provider.set(value);
    (*provider).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::render::RenderTrigger;
    use crate::runtime::Runtime;

    #[test]
    fn latest_provider_wins_and_falls_back() {
        let theme = create_dependency("light");
        let first = theme.provide("dark");
        let second = theme.provide("contrast");
        assert_eq!(theme.get(), "contrast");

        second.unregister();
        assert_eq!(theme.get(), "dark");
        drop(first);
        assert_eq!(theme.get(), "light");
    }

    #[test]
    fn removing_older_provider_keeps_latest() {
        let dep = create_dependency(0);
        let old = dep.provide(1);
        let _new = dep.provide(2);
        old.unregister();
        assert_eq!(dep.get(), 2);
        assert_eq!(dep.provider_count(), 1);
    }

    #[test]
    fn consumers_rerender_when_provider_changes() {
        let rt = Runtime::new();
        let dep = create_dependency(String::from("default"));
        let trigger = RenderTrigger::new(&rt, || {});
        let consumer = Scope::new(&rt, trigger.clone());
        let seen = use_dependency(&consumer, &dep);

        let producer = Scope::new(&rt, RenderTrigger::noop());
        let provider = provide_dependency(&producer, &dep, String::from("a"));
        provider.set(String::from("b"));
        rt.run_until_idle();
        assert_eq!(seen.get(), "b");
        assert_eq!(trigger.render_count(), 1);

        producer.unmount();
        assert_eq!(seen.get(), "default");
        assert!(!provider.is_active());
    }
}
