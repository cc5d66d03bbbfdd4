mod common;

use std::cell::RefCell;
use std::rc::Rc;

use bindery::dataview::{DataView, DataViewState, SortKey, SortOrder, SortValue};
use bindery::form::Value;
use bindery::platform::{MemoryBackend, MemoryStore, ViewStateStore};
use bindery::Runtime;
use common::{val, Counter};
use proptest::prelude::*;
use serde_json::json;

fn items(values: serde_json::Value) -> Rc<Vec<Value>> {
    match val(values) {
        Value::Array(items) => Rc::new(items),
        other => panic!("expected an array, got {other:?}"),
    }
}

fn ids(page: &[Value]) -> Vec<String> {
    page.iter()
        .map(|item| item.pointer(&"id".into()).map(Value::to_display_string).unwrap_or_default())
        .collect()
}

#[test]
fn test_paging_past_the_last_page_is_empty() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 2);
    let list = items(json!([
        {"id": "a"}, {"id": "b"}, {"id": "c"}, {"id": "d"}, {"id": "e"}
    ]));

    let (page, total) = view.get_view(&list);
    assert_eq!(ids(&page), vec!["a", "b"]);
    assert_eq!(total, 5);
    assert_eq!(view.item_count().get(), Some(5));
    assert_eq!(view.page_count().get(), 3);

    view.set_page_index(2);
    let (page, _) = view.get_view(&list);
    assert_eq!(ids(&page), vec!["e"]);

    view.set_page_index(3);
    let (page, total) = view.get_view(&list);
    assert!(page.is_empty());
    assert_eq!(total, 5);
    assert_eq!(view.page_index(), 3);
}

#[test]
fn test_default_page_size_comes_from_runtime_settings() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::new(&rt);
    assert_eq!(view.page_size(), rt.settings().default_page_size);
}

#[test]
fn test_page_size_write_resets_page_index() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 1);
    view.get_view(&items(json!([1, 2, 3, 4])));
    view.set_page_index(3);
    view.set_page_size(2);
    assert_eq!(view.page_index(), 0);
    assert_eq!(view.page_count().get(), 2);
}

#[test]
fn test_state_writes_are_whole_numbers() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 10);
    view.state().set("pageSize", 2.7);
    assert_eq!(view.page_size(), 2);
    view.state().set("pageIndex", -4);
    assert_eq!(view.page_index(), 0);
    view.state().set("pageIndex", "nope");
    assert_eq!(view.page_index(), 0);
}

#[test]
fn test_sorts_by_current_sort_field() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 0);
    let list = items(json!([
        {"id": "b", "name": "banana"},
        {"id": "a", "name": "Apple"},
        {"id": "c", "name": "cherry"},
        {"id": "n"}
    ]));

    let (page, _) = view.get_view(&list);
    assert_eq!(ids(&page), vec!["b", "a", "c", "n"]);

    view.set_sort_by(Some("name"));
    let (page, _) = view.get_view(&list);
    assert_eq!(ids(&page), vec!["n", "a", "b", "c"]);

    view.set_sort_order(SortOrder::Desc);
    let (page, _) = view.get_view(&list);
    assert_eq!(ids(&page), vec!["c", "b", "a", "n"]);
}

/// A column mixing numbers and text sorts entirely as text.
#[test]
fn test_mixed_number_and_text_keys_sort_as_text() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 0);
    view.set_sort_by(Some("k"));
    let mut rows: Vec<serde_json::Value> = (0..100)
        .map(|i| {
            if i % 2 == 0 {
                json!({"id": format!("n{i}"), "k": i})
            } else {
                json!({"id": format!("s{i}"), "k": i.to_string()})
            }
        })
        .collect();
    rows.push(json!({"id": "none", "k": null}));
    let list = items(serde_json::Value::Array(rows));

    let (page, total) = view.get_view(&list);
    assert_eq!(total, 101);
    let got = ids(&page);
    assert_eq!(&got[..4], &["none", "n0", "s1", "n10"]);

    let keys: Vec<String> = page[1..]
        .iter()
        .filter_map(|item| item.pointer(&"k".into()).map(Value::to_display_string))
        .collect();
    let mut expected = keys.clone();
    expected.sort();
    assert_eq!(keys, expected);
}

#[test]
fn test_toggle_sort_flips_same_field() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 10);

    view.toggle_sort("name", None);
    assert_eq!(view.sort_by().as_deref(), Some("name"));
    assert_eq!(view.sort_order(), SortOrder::Asc);

    view.toggle_sort("name", None);
    assert_eq!(view.sort_order(), SortOrder::Desc);

    view.toggle_sort("age", Some(SortOrder::Desc));
    assert_eq!(view.sort_by().as_deref(), Some("age"));
    assert_eq!(view.sort_order(), SortOrder::Desc);
}

#[test]
fn test_sort_with_custom_key() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 10);
    let list = items(json!(["ccc", "a", "bb"]));
    let by_len = SortKey::with(|item: &Value| {
        SortValue::from(item.as_str().map_or(0, str::len) as i64)
    });
    let sorted = view.sort(&list, Some(by_len));
    assert_eq!(sorted, vec![Value::from("a"), Value::from("bb"), Value::from("ccc")]);
}

#[test]
fn test_callback_runs_only_when_query_or_items_change() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 10);
    let list = items(json!([{"tag": "x"}, {"tag": "y"}, {"tag": "x"}]));
    let calls = Counter::new();

    let run = |list: &Rc<Vec<Value>>| {
        let calls = calls.clone();
        view.get_view_with(list, move |items, query| {
            calls.hit();
            match query.filters.get("tag") {
                Some(tag) => items
                    .iter()
                    .filter(|item| item.pointer(&"tag".into()) == Some(tag))
                    .cloned()
                    .collect(),
                None => items.to_vec(),
            }
        })
    };

    assert_eq!(run(&list).1, 3);
    assert_eq!(run(&list).1, 3);
    assert_eq!(calls.get(), 1);

    view.filters().set("tag", "x");
    assert_eq!(run(&list).1, 2);
    assert_eq!(calls.get(), 2);
    assert_eq!(view.item_count().get(), Some(2));

    // Same filter value: no invalidation.
    view.filters().set("tag", "x");
    run(&list);
    assert_eq!(calls.get(), 2);

    // A new list instance always recomputes.
    let copy = Rc::new((*list).clone());
    run(&copy);
    assert_eq!(calls.get(), 3);
}

#[test]
fn test_filter_removal_invalidates() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 10);
    view.filters().set("q", "a");
    assert_eq!(view.filters().get("q"), Some(Value::from("a")));
    assert_eq!(view.filters().remove("q"), Some(Value::from("a")));
    assert!(view.query().filters.is_empty());
    assert_eq!(view.filters().remove("q"), None);
}

#[test]
fn test_view_change_coalesces_a_burst() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 10);
    let changes = Counter::new();
    let c = changes.clone();
    let _sub = view.on_view_change(move || c.hit());

    view.set_sort_by(Some("name"));
    view.set_page_size(5);
    view.filters().set("q", "x");
    assert_eq!(changes.get(), 0);
    rt.run_until_idle();
    assert_eq!(changes.get(), 1);

    view.set_page_index(1);
    rt.run_until_idle();
    assert_eq!(changes.get(), 2);
}

#[test]
fn test_reset_restores_defaults() {
    let rt = Runtime::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 7);
    view.set_sort_by(Some("name"));
    view.set_page_size(3);
    view.filters().set("q", "x");

    view.reset(None);
    assert_eq!(
        view.to_state(),
        DataViewState {
            page_size: 7,
            ..DataViewState::default()
        }
    );
}

#[test]
fn test_store_saves_and_pops_view_state() {
    let rt = Runtime::new();
    let backend = MemoryBackend::new();
    let store = Rc::new(MemoryStore::new(&backend, "people"));
    let view: DataView<Value> = DataView::with_page_size(&rt, 10);
    assert!(!view.attach_store(store.clone()));

    view.set_sort_by(Some("name"));
    rt.run_until_idle();
    assert_eq!(backend.history_len("people"), 1);

    view.set_sort_order(SortOrder::Desc);
    rt.run_until_idle();
    assert_eq!(backend.history_len("people"), 2);
    assert_eq!(
        store.get().and_then(|v| v.pointer(&"sortOrder".into()).cloned()),
        Some(Value::from("desc"))
    );

    let restored = store.pop_state();
    assert!(restored.is_some());
    assert_eq!(view.sort_order(), SortOrder::Asc);
    assert_eq!(view.sort_by().as_deref(), Some("name"));
    rt.run_until_idle();
    assert_eq!(backend.history_len("people"), 1);

    let again: DataView<Value> = DataView::with_page_size(&rt, 10);
    assert!(again.attach_store(Rc::new(MemoryStore::new(&backend, "people"))));
    assert_eq!(again.sort_by().as_deref(), Some("name"));
}

#[test]
fn test_unchanged_state_is_not_saved_twice() {
    let rt = Runtime::new();
    let backend = MemoryBackend::new();
    let view: DataView<Value> = DataView::with_page_size(&rt, 10);
    view.attach_store(Rc::new(MemoryStore::new(&backend, "v")));

    let seen = Rc::new(RefCell::new(0));
    let s = Rc::clone(&seen);
    let _sub = view.on_view_change(move || *s.borrow_mut() += 1);

    view.set_sort_by(Some("a"));
    rt.run_until_idle();
    view.set_sort_by(Some("b"));
    view.set_sort_by(Some("a"));
    rt.run_until_idle();
    assert_eq!(*seen.borrow(), 2);
    assert_eq!(backend.history_len("v"), 1);
}

proptest! {
    #[test]
    fn prop_sort_is_stable(keys in proptest::collection::vec(0i64..4, 0..24), desc in any::<bool>()) {
        let rt = Runtime::new();
        let view: DataView<Value> = DataView::with_page_size(&rt, 0);
        let list: Vec<Value> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| val(json!({"k": k, "i": i})))
            .collect();
        let order = if desc { SortOrder::Desc } else { SortOrder::Asc };
        view.set_sort_order(order);
        let sorted = view.sort(&list, Some(SortKey::from("k")));

        prop_assert_eq!(sorted.len(), list.len());
        let pairs: Vec<(f64, f64)> = sorted
            .iter()
            .map(|item| {
                let k = item.pointer(&"k".into()).and_then(Value::as_f64).unwrap_or(-1.0);
                let i = item.pointer(&"i".into()).and_then(Value::as_f64).unwrap_or(-1.0);
                (k, i)
            })
            .collect();
        for pair in pairs.windows(2) {
            let ((k1, i1), (k2, i2)) = (pair[0], pair[1]);
            if desc {
                prop_assert!(k1 >= k2);
            } else {
                prop_assert!(k1 <= k2);
            }
            if k1 == k2 {
                prop_assert!(i1 < i2);
            }
        }
    }
}

fn mixed_key() -> impl Strategy<Value = serde_json::Value> {
    prop_oneof![
        Just(json!(null)),
        (-50i64..50).prop_map(|n| json!(n)),
        (-50.0f64..50.0).prop_map(|n| json!(n)),
        (-50i64..50).prop_map(|n| json!(n.to_string())),
        "[a-zA-Z]{0,3}".prop_map(|s| json!(s)),
        proptest::collection::vec(0i64..3, 0..3).prop_map(|v| json!(v)),
    ]
}

proptest! {
    #[test]
    fn prop_mixed_keys_sort_to_a_fixed_point(keys in proptest::collection::vec(mixed_key(), 0..200)) {
        let rt = Runtime::new();
        let view: DataView<Value> = DataView::with_page_size(&rt, 0);
        view.set_sort_by(Some("k"));
        let list: Vec<Value> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| val(json!({"k": k, "i": i})))
            .collect();

        let sorted = view.sort(&list, None);
        prop_assert_eq!(sorted.len(), list.len());
        let nulls = keys.iter().filter(|k| k.is_null()).count();
        prop_assert!(sorted[..nulls].iter().all(|item| item.pointer(&"k".into()) == Some(&Value::Null)));

        // A total, stable order leaves sorted input untouched.
        let again = view.sort(&sorted, None);
        prop_assert_eq!(again, sorted);
    }
}
