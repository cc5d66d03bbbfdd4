mod common;

use bindery::form::{DataError, Path, Value};
use bindery::Runtime;
use common::{tree, val, ChangeLog};
use serde_json::json;

/// Writing an equal value is silent; a new value reports its path.
#[test]
fn test_equal_write_is_silent_and_change_reports_path() {
    let rt = Runtime::new();
    let tree = tree(&rt, json!({"foo": 1}));
    let log = ChangeLog::attach(&tree);

    assert!(!tree.set(tree.root(), "foo", 1).unwrap());
    rt.run_until_idle();
    assert_eq!(log.count(), 0);

    assert!(tree.set(tree.root(), "foo", 2).unwrap());
    rt.run_until_idle();
    assert_eq!(log.events(), vec![vec!["foo".to_string()]]);
}

/// A nested write reports the leaf and every ancestor.
#[test]
fn test_nested_write_reports_ancestors() {
    let rt = Runtime::new();
    let tree = tree(&rt, json!({"a": {"b": 1}}));
    let log = ChangeLog::attach(&tree);

    tree.set_path(&Path::parse("a.b"), 2).unwrap();
    rt.run_until_idle();
    assert_eq!(log.events(), vec![vec!["a".to_string(), "a.b".to_string()]]);
}

/// Writes in one synchronous burst produce one deduplicated notification.
#[test]
fn test_burst_coalesces_into_one_change() {
    let rt = Runtime::new();
    let tree = tree(&rt, json!({"a": {"x": 0, "y": 0}}));
    let log = ChangeLog::attach(&tree);

    for i in 1..=3 {
        tree.set_path(&Path::parse("a.x"), i).unwrap();
    }
    tree.set_path(&Path::parse("a.y"), 5).unwrap();
    rt.run_until_idle();

    assert_eq!(
        log.events(),
        vec![vec!["a".to_string(), "a.x".to_string(), "a.y".to_string()]]
    );
}

/// `0` over `-0` and `NaN` over `NaN` are not changes.
#[test]
fn test_same_value_zero_writes_are_noops() {
    let rt = Runtime::new();
    let tree = tree(&rt, json!({}));
    tree.set(tree.root(), "z", -0.0).unwrap();
    tree.set(tree.root(), "n", f64::NAN).unwrap();
    rt.run_until_idle();

    let log = ChangeLog::attach(&tree);
    assert!(!tree.set(tree.root(), "z", 0.0).unwrap());
    assert!(!tree.set(tree.root(), "n", f64::NAN).unwrap());
    rt.run_until_idle();
    assert_eq!(log.count(), 0);
}

/// Assigning an object over an object keeps the node, dropping keys that
/// are gone.
#[test]
fn test_object_assignment_merges_in_place() {
    let rt = Runtime::new();
    let tree = tree(&rt, json!({"user": {"name": "a", "age": 3}}));
    let user = tree.child(tree.root(), "user").unwrap();
    let id = tree.unique_id(user);

    tree.set(tree.root(), "user", val(json!({"name": "b"}))).unwrap();
    assert_eq!(tree.child(tree.root(), "user"), Some(user));
    assert_eq!(tree.unique_id(user), id);
    assert_eq!(tree.value(user), val(json!({"name": "b"})));
}

/// A detached node keeps accepting writes but never reports them.
#[test]
fn test_detached_node_is_inert() {
    let rt = Runtime::new();
    let tree = tree(&rt, json!({"a": {"b": 1}}));
    let a = tree.child(tree.root(), "a").unwrap();
    tree.delete(tree.root(), "a").unwrap();
    rt.run_until_idle();

    let log = ChangeLog::attach(&tree);
    tree.set(a, "b", 2).unwrap();
    rt.run_until_idle();
    assert!(!tree.is_attached(a));
    assert_eq!(tree.path_of(a), None);
    assert_eq!(log.count(), 0);
}

/// Tracked nodes cannot be assigned elsewhere; copies can.
#[test]
fn test_tracked_node_assignment_fails() {
    let rt = Runtime::new();
    let tree = tree(&rt, json!({"a": {"b": 1}, "c": null}));
    let a = tree.child(tree.root(), "a").unwrap();

    assert_eq!(tree.set_node(tree.root(), "c", a), Err(DataError::TrackedNode));

    let copy = tree.value(a);
    tree.set(tree.root(), "c", copy).unwrap();
    assert_ne!(tree.child(tree.root(), "c"), Some(a));
    assert_eq!(tree.lookup(&Path::parse("c.b")), Some(Value::from(1)));
}

/// Shrinking an array reports every truncated index.
#[test]
fn test_truncation_reports_removed_indices() {
    let rt = Runtime::new();
    let tree = tree(&rt, json!({"list": [1, 2, 3]}));
    let list = tree.child(tree.root(), "list").unwrap();
    let log = ChangeLog::attach(&tree);

    tree.set_len(list, 1).unwrap();
    rt.run_until_idle();
    assert_eq!(
        log.events(),
        vec![vec!["list".to_string(), "list.1".to_string(), "list.2".to_string()]]
    );
    assert_eq!(tree.value(list), val(json!([1])));
}

/// Batches flush synchronously on exit; re-entrant batches join.
#[test]
fn test_batch_flushes_on_outer_exit() {
    let rt = Runtime::new();
    let tree = tree(&rt, json!({"a": 0, "b": 0}));
    let log = ChangeLog::attach(&tree);

    tree.batch(|| {
        tree.set(tree.root(), "a", 1).unwrap();
        tree.batch(|| tree.set(tree.root(), "b", 1).unwrap());
        assert_eq!(log.count(), 0);
    });
    assert_eq!(log.events(), vec![vec!["a".to_string(), "b".to_string()]]);
}

/// Leaf values cannot be the root.
#[test]
fn test_leaf_root_is_rejected() {
    let rt = Runtime::new();
    let err = bindery::form::DataTree::new(&rt, Value::from("x")).unwrap_err();
    assert_eq!(err, DataError::NotContainer { found: "string" });
}
