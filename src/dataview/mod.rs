//! Filterable, sortable, paged projection over an item list.
//!
//! The view keeps its state in an [`ObservableObject`] (`sortBy`,
//! `sortOrder`, `pageIndex`, `pageSize`) plus a bag of filters. Sorting is
//! cached per item list and invalidated by filter and sort writes; paging
//! is applied on every [`DataView::get_view`].

pub mod sort;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::form::value::Value;
use crate::hooks::observable::{Listeners, Observable, ObservableObject, Subscription};
use crate::platform::view_state::ViewStateStore;
use crate::runtime::Runtime;

pub use sort::{compare, sort_items, SortField, SortKey, SortOrder, SortValue};

const SORT_BY: &str = "sortBy";
const SORT_ORDER: &str = "sortOrder";
const PAGE_INDEX: &str = "pageIndex";
const PAGE_SIZE: &str = "pageSize";

/// Serializable view state, as handed to a [`ViewStateStore`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataViewState {
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
    pub page_index: usize,
    pub page_size: usize,
    pub filters: IndexMap<String, Value>,
}

/// What a view callback sees besides the items.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewQuery {
    pub filters: IndexMap<String, Value>,
    pub sort_by: Option<String>,
    pub sort_order: SortOrder,
}

/// The filter bag. Each changing write resets paging and invalidates the
/// cached result.
#[derive(Clone)]
pub struct Filters {
    object: ObservableObject,
    on_write: Rc<dyn Fn()>,
}

impl Filters {
    pub fn get(&self, key: &str) -> Option<Value> {
        self.object.get(key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
        if !self.object.is_observable(key) {
            let _ = self.object.define(key, Value::Null, None);
        }
        let changed = self.object.set(key, value);
        if changed {
            (self.on_write)();
        }
        changed
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self.object.remove(key);
        if removed.is_some() {
            (self.on_write)();
        }
        removed
    }

    pub fn to_map(&self) -> IndexMap<String, Value> {
        self.object.to_map()
    }

    pub fn watch(&self, key: &str, callback: impl Fn(&Value, &Value) + 'static) -> Subscription {
        self.object.watch(key, callback)
    }
}

impl fmt::Debug for Filters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.to_map()).finish()
    }
}

struct ViewCache<T> {
    items: Rc<Vec<T>>,
    result: Rc<Vec<T>>,
}

pub struct DataView<T> {
    inner: Rc<ViewInner<T>>,
}

impl<T> Clone for DataView<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct ViewInner<T> {
    runtime: Runtime,
    state: ObservableObject,
    filters: Filters,
    default_page_size: usize,
    item_count: Observable<Option<usize>>,
    page_count: Observable<usize>,
    cache: RefCell<Option<ViewCache<T>>>,
    view_listeners: Rc<Listeners<dyn Fn()>>,
    view_change_scheduled: Cell<bool>,
    subscriptions: RefCell<Vec<Subscription>>,
}

impl<T: Clone + SortField + 'static> DataView<T> {
    /// A view paged by the runtime's default page size.
    pub fn new(runtime: &Runtime) -> Self {
        Self::with_page_size(runtime, runtime.settings().default_page_size)
    }

    /// `page_size == 0` disables paging.
    pub fn with_page_size(runtime: &Runtime, page_size: usize) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ViewInner<T>>| {
            let state = ObservableObject::new(runtime);
            let _ = state.define(SORT_BY, Value::Null, None);
            let _ = state.define(SORT_ORDER, SortOrder::Asc.as_str(), None);
            let _ = state.define(PAGE_INDEX, 0, Some(Rc::new(|new: Value, _: &Value| whole(&new))));
            let _ = state.define(PAGE_SIZE, page_size, Some(Rc::new(|new: Value, _: &Value| whole(&new))));

            let on_write = {
                let weak = weak.clone();
                Rc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        DataView { inner }.query_changed();
                    }
                }) as Rc<dyn Fn()>
            };
            ViewInner {
                runtime: runtime.clone(),
                state,
                filters: Filters {
                    object: ObservableObject::new(runtime),
                    on_write,
                },
                default_page_size: page_size,
                item_count: Observable::new(None),
                page_count: Observable::new(0),
                cache: RefCell::new(None),
                view_listeners: Listeners::new(),
                view_change_scheduled: Cell::new(false),
                subscriptions: RefCell::new(Vec::new()),
            }
        });
        let view = Self { inner };
        view.wire();
        view
    }

    fn wire(&self) {
        let mut subscriptions = Vec::new();
        for key in [SORT_BY, SORT_ORDER] {
            let weak = Rc::downgrade(&self.inner);
            subscriptions.push(self.inner.state.watch(key, move |_, _| {
                if let Some(inner) = weak.upgrade() {
                    DataView { inner }.query_changed();
                }
            }));
        }
        let weak = Rc::downgrade(&self.inner);
        subscriptions.push(self.inner.state.watch(PAGE_SIZE, move |_, _| {
            if let Some(inner) = weak.upgrade() {
                let view = DataView { inner };
                view.recount();
                view.set_page_index(0);
                view.schedule_view_change();
            }
        }));
        let weak = Rc::downgrade(&self.inner);
        subscriptions.push(self.inner.state.watch(PAGE_INDEX, move |_, _| {
            if let Some(inner) = weak.upgrade() {
                DataView { inner }.schedule_view_change();
            }
        }));
        let weak = Rc::downgrade(&self.inner);
        subscriptions.push(self.inner.page_count.watch(move |count, _| {
            if let Some(inner) = weak.upgrade() {
                let view = DataView { inner };
                let last = count.saturating_sub(1);
                if *count > 0 && view.page_index() > last {
                    view.set_page_index(last);
                }
            }
        }));
        self.inner.subscriptions.borrow_mut().extend(subscriptions);
    }

    // -- state ---------------------------------------------------------------

    pub fn filters(&self) -> &Filters {
        &self.inner.filters
    }

    /// The underlying observable state object.
    pub fn state(&self) -> &ObservableObject {
        &self.inner.state
    }

    pub fn sort_by(&self) -> Option<String> {
        self.inner
            .state
            .get(SORT_BY)
            .and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn set_sort_by(&self, field: Option<&str>) {
        self.inner.state.set(SORT_BY, field.map(str::to_string));
    }

    pub fn sort_order(&self) -> SortOrder {
        self.inner
            .state
            .get(SORT_ORDER)
            .and_then(|v| v.as_str().map(SortOrder::parse))
            .unwrap_or_default()
    }

    pub fn set_sort_order(&self, order: SortOrder) {
        self.inner.state.set(SORT_ORDER, order.as_str());
    }

    pub fn page_index(&self) -> usize {
        self.read_whole(PAGE_INDEX)
    }

    pub fn set_page_index(&self, index: usize) {
        self.inner.state.set(PAGE_INDEX, index);
    }

    pub fn page_size(&self) -> usize {
        self.read_whole(PAGE_SIZE)
    }

    pub fn set_page_size(&self, size: usize) {
        self.inner.state.set(PAGE_SIZE, size);
    }

    fn read_whole(&self, key: &str) -> usize {
        self.inner
            .state
            .get(key)
            .and_then(|v| v.as_f64())
            .map_or(0, |n| n as usize)
    }

    /// Item count after filtering, once a view has been computed.
    pub fn item_count(&self) -> &Observable<Option<usize>> {
        &self.inner.item_count
    }

    pub fn page_count(&self) -> &Observable<usize> {
        &self.inner.page_count
    }

    /// Sort by `field`, flipping the order if already sorted by it.
    pub fn toggle_sort(&self, field: &str, default_order: Option<SortOrder>) {
        if self.sort_by().as_deref() == Some(field) {
            self.set_sort_order(self.sort_order().flip());
        } else {
            self.inner.state.set(SORT_BY, field);
            self.set_sort_order(default_order.unwrap_or_default());
        }
    }

    pub fn query(&self) -> ViewQuery {
        ViewQuery {
            filters: self.inner.filters.to_map(),
            sort_by: self.sort_by(),
            sort_order: self.sort_order(),
        }
    }

    // -- projection ----------------------------------------------------------

    /// Sort a copy of `items` by `key`, or by the current `sortBy`.
    pub fn sort(&self, items: &[T], key: Option<SortKey<T>>) -> Vec<T> {
        let key = match key.or_else(|| self.sort_by().map(SortKey::Field)) {
            Some(key) => key,
            None => return items.to_vec(),
        };
        sort_items(items, &key, self.sort_order())
    }

    /// The current page and the total item count, sorting by the current
    /// state.
    pub fn get_view(&self, items: &Rc<Vec<T>>) -> (Vec<T>, usize) {
        self.get_view_with(items, |items, _| self.sort(items, None))
    }

    /// Like [`get_view`](Self::get_view) with a custom filter/sort step.
    /// `callback` only runs when `items` changed or the query was written
    /// since the last call.
    pub fn get_view_with(&self, items: &Rc<Vec<T>>, callback: impl FnOnce(&[T], &ViewQuery) -> Vec<T>) -> (Vec<T>, usize) {
        let cached = self
            .inner
            .cache
            .borrow()
            .as_ref()
            .filter(|cache| Rc::ptr_eq(&cache.items, items))
            .map(|cache| Rc::clone(&cache.result));
        let result = match cached {
            Some(result) => result,
            None => {
                let result = Rc::new(callback(items, &self.query()));
                *self.inner.cache.borrow_mut() = Some(ViewCache {
                    items: Rc::clone(items),
                    result: Rc::clone(&result),
                });
                result
            }
        };

        let total = result.len();
        self.inner.item_count.set(Some(total));
        self.recount();

        let size = self.page_size();
        let page = if size == 0 {
            result.to_vec()
        } else {
            let start = self.page_index().saturating_mul(size);
            result.iter().skip(start).take(size).cloned().collect()
        };
        (page, total)
    }

    fn recount(&self) {
        let Some(count) = self.inner.item_count.get() else {
            return;
        };
        let size = self.page_size();
        let pages = if size == 0 {
            usize::from(count > 0)
        } else {
            count.div_ceil(size)
        };
        self.inner.page_count.set(pages);
    }

    fn invalidate(&self) {
        if self.inner.cache.borrow_mut().take().is_some() {
            tracing::trace!("view cache invalidated");
        }
    }

    /// Filters or sort changed.
    fn query_changed(&self) {
        self.invalidate();
        self.set_page_index(0);
        self.schedule_view_change();
    }

    // -- events --------------------------------------------------------------

    /// Called once per burst of state writes.
    pub fn on_view_change(&self, listener: impl Fn() + 'static) -> Subscription {
        self.inner.view_listeners.add(Rc::new(listener))
    }

    fn schedule_view_change(&self) {
        if self.inner.view_change_scheduled.replace(true) {
            return;
        }
        let weak = Rc::downgrade(&self.inner);
        self.inner.runtime.queue_microtask(move || {
            if let Some(inner) = weak.upgrade() {
                inner.view_change_scheduled.set(false);
                for listener in inner.view_listeners.snapshot() {
                    listener();
                }
            }
        });
    }

    // -- persistence ---------------------------------------------------------

    pub fn to_state(&self) -> DataViewState {
        DataViewState {
            sort_by: self.sort_by(),
            sort_order: self.sort_order(),
            page_index: self.page_index(),
            page_size: self.page_size(),
            filters: self.inner.filters.to_map(),
        }
    }

    /// Apply `state`, or the initial state when `None`.
    pub fn reset(&self, state: Option<DataViewState>) {
        let state = state.unwrap_or_else(|| DataViewState {
            page_size: self.inner.default_page_size,
            ..DataViewState::default()
        });
        let filters = &self.inner.filters;
        for key in filters.object.keys() {
            if !state.filters.contains_key(&key) {
                let _ = filters.object.remove(&key);
            }
        }
        for (key, value) in &state.filters {
            filters.set(key, value.clone());
        }
        self.invalidate();
        self.set_sort_by(state.sort_by.as_deref());
        self.set_sort_order(state.sort_order);
        self.set_page_size(state.page_size);
        self.set_page_index(state.page_index);
        self.schedule_view_change();
    }

    /// Restore from `store`, then save to it after every view change.
    /// History pops from the store reset the view. Returns whether a saved
    /// state was applied.
    pub fn attach_store(&self, store: Rc<dyn ViewStateStore>) -> bool {
        let last_saved: Rc<RefCell<Option<DataViewState>>> = Rc::new(RefCell::new(None));
        let restored = match store.get().map(decode_state) {
            Some(Some(state)) => {
                *last_saved.borrow_mut() = Some(state.clone());
                self.reset(Some(state));
                true
            }
            Some(None) => {
                tracing::warn!("ignoring unreadable data view state");
                false
            }
            None => false,
        };

        let weak = Rc::downgrade(&self.inner);
        let saving = Rc::clone(&store);
        let saved = Rc::clone(&last_saved);
        let on_change = self.on_view_change(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let state = DataView { inner }.to_state();
            if saved.borrow().as_ref() == Some(&state) {
                return;
            }
            match encode_state(&state) {
                Some(value) => {
                    if let Err(error) = saving.set(value, true) {
                        tracing::warn!(%error, "failed to save data view state");
                    }
                    *saved.borrow_mut() = Some(state);
                }
                None => tracing::warn!("failed to encode data view state"),
            }
        });

        let weak = Rc::downgrade(&self.inner);
        let on_pop = store.on_pop_state(Rc::new(move |value: &Value| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if let Some(state) = decode_state(value.clone()) {
                *last_saved.borrow_mut() = Some(state.clone());
                DataView { inner }.reset(Some(state));
            }
        }));
        self.inner
            .subscriptions
            .borrow_mut()
            .extend([on_change, on_pop]);
        restored
    }
}

impl<T> fmt::Debug for DataView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataView")
            .field("state", &self.inner.state)
            .field("filters", &self.inner.filters)
            .field("item_count", &self.inner.item_count.get())
            .finish()
    }
}

/// Non-negative whole number, anything else becomes `0`.
fn whole(value: &Value) -> Value {
    match value.as_f64() {
        Some(n) if n.is_finite() && n > 0.0 => Value::Number(n.floor()),
        _ => Value::Number(0.0),
    }
}

fn encode_state(state: &DataViewState) -> Option<Value> {
    serde_json::to_value(state).ok().map(Value::from)
}

fn decode_state(value: Value) -> Option<DataViewState> {
    serde_json::from_value(serde_json::Value::from(value)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn items(values: serde_json::Value) -> Rc<Vec<Value>> {
        let serde_json::Value::Array(values) = values else {
            panic!("expected an array");
        };
        Rc::new(values.into_iter().map(Value::from).collect())
    }

    #[test]
    fn page_index_is_clamped_when_page_count_shrinks() {
        let rt = Runtime::new();
        let view: DataView<Value> = DataView::with_page_size(&rt, 2);
        let list = items(json!([1, 2, 3, 4, 5]));
        view.get_view(&list);
        view.set_page_index(2);

        let short = items(json!([1, 2]));
        let (page, total) = view.get_view(&short);
        assert_eq!(total, 2);
        assert_eq!(view.page_index(), 0);
        assert_eq!(page.len(), 2);
    }

    #[test]
    fn page_size_zero_disables_paging() {
        let rt = Runtime::new();
        let view: DataView<Value> = DataView::with_page_size(&rt, 0);
        let (page, total) = view.get_view(&items(json!([1, 2, 3])));
        assert_eq!((page.len(), total), (3, 3));
        assert_eq!(view.page_count().get(), 1);
    }

    #[test]
    fn filter_write_resets_page_index() {
        let rt = Runtime::new();
        let view: DataView<Value> = DataView::with_page_size(&rt, 1);
        view.get_view(&items(json!([1, 2, 3])));
        view.set_page_index(2);
        view.filters().set("q", "x");
        assert_eq!(view.page_index(), 0);
    }

    #[test]
    fn state_round_trips_through_json() {
        let state = DataViewState {
            sort_by: Some("name".into()),
            sort_order: SortOrder::Desc,
            page_index: 1,
            page_size: 10,
            filters: IndexMap::from([("q".to_string(), Value::from("a"))]),
        };
        let value = encode_state(&state).unwrap();
        assert_eq!(value.pointer(&"sortOrder".into()), Some(&Value::from("desc")));
        assert_eq!(decode_state(value), Some(state));
    }
}
