//! Sort keys and the comparator used by [`DataView`](super::DataView).
//!
//! `null` sorts before everything. When either side is text both are
//! compared as text, case-insensitively first and lowercase before
//! uppercase on ties. Anything else compares numerically, with NaN after
//! every number. Lists compare element by element and after any scalar.
//!
//! [`sort_items`] first turns every number in a column that holds any text
//! into text, so one sort never sees both.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use unicase::UniCase;

use crate::form::value::{Path, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn flip(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// `"desc"` is descending, anything else ascending.
    pub fn parse(text: &str) -> Self {
        if text.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A comparable extracted from an item.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Null,
    Number(f64),
    Text(String),
    List(Vec<SortValue>),
}

impl SortValue {
    fn as_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Number(n) => Value::Number(*n).to_display_string(),
            Self::Text(s) => s.clone(),
            Self::List(items) => items.iter().map(Self::as_text).collect::<Vec<_>>().join(","),
        }
    }

    fn as_number(&self) -> f64 {
        match self {
            Self::Null => 0.0,
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().unwrap_or(f64::NAN),
            Self::List(items) => match items.as_slice() {
                [single] => single.as_number(),
                _ => f64::NAN,
            },
        }
    }
}

impl From<&Value> for SortValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Number(if *b { 1.0 } else { 0.0 }),
            Value::Number(n) => Self::Number(*n),
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) => Self::List(items.iter().map(Self::from).collect()),
            Value::Object(_) => Self::Text(value.to_display_string()),
        }
    }
}

impl From<f64> for SortValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for SortValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for SortValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SortValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl<T: Into<SortValue>> From<Option<T>> for SortValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<Vec<SortValue>> for SortValue {
    fn from(items: Vec<SortValue>) -> Self {
        Self::List(items)
    }
}

pub fn compare(a: &SortValue, b: &SortValue) -> Ordering {
    match (a, b) {
        (SortValue::Null, SortValue::Null) => Ordering::Equal,
        (SortValue::Null, _) => Ordering::Less,
        (_, SortValue::Null) => Ordering::Greater,
        (SortValue::List(a), SortValue::List(b)) => {
            for (x, y) in a.iter().zip(b) {
                match compare(x, y) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            a.len().cmp(&b.len())
        }
        (SortValue::List(_), _) => Ordering::Greater,
        (_, SortValue::List(_)) => Ordering::Less,
        (SortValue::Text(_), _) | (_, SortValue::Text(_)) => compare_text(&a.as_text(), &b.as_text()),
        _ => compare_numbers(a.as_number(), b.as_number()),
    }
}

fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    UniCase::new(a).cmp(&UniCase::new(b)).then_with(|| {
        // Same letters: lowercase first.
        let shape = |s: &str| s.chars().map(|c| !c.is_lowercase()).collect::<Vec<_>>();
        shape(a).cmp(&shape(b))
    })
}

/// One text value in a column makes the whole column text. List elements
/// form a column per position.
fn unify_column(mut column: Vec<&mut SortValue>) {
    if column.iter().any(|v| matches!(v, SortValue::Text(_))) {
        for value in column.iter_mut() {
            if let SortValue::Number(_) = value {
                **value = SortValue::Text(value.as_text());
            }
        }
    }
    let width = column
        .iter()
        .map(|v| match v {
            SortValue::List(items) => items.len(),
            _ => 0,
        })
        .max()
        .unwrap_or(0);
    for i in 0..width {
        let nested = column
            .iter_mut()
            .filter_map(|v| match &mut **v {
                SortValue::List(items) => items.get_mut(i),
                _ => None,
            })
            .collect();
        unify_column(nested);
    }
}

/// Items that can be sorted by a named field.
pub trait SortField {
    fn sort_value(&self, field: &str) -> SortValue;
}

/// Dotted paths into objects, e.g. `"owner.name"`.
impl SortField for Value {
    fn sort_value(&self, field: &str) -> SortValue {
        self.pointer(&Path::parse(field))
            .map_or(SortValue::Null, SortValue::from)
    }
}

impl SortField for serde_json::Value {
    fn sort_value(&self, field: &str) -> SortValue {
        let pointer = format!("/{}", field.replace('.', "/"));
        self.pointer(&pointer)
            .map_or(SortValue::Null, |v| SortValue::from(&Value::from(v.clone())))
    }
}

/// How to pull a comparable out of an item.
pub enum SortKey<T> {
    Field(String),
    /// Several fields, compared in order.
    Fields(Vec<String>),
    With(Rc<dyn Fn(&T) -> SortValue>),
}

impl<T> Clone for SortKey<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Field(field) => Self::Field(field.clone()),
            Self::Fields(fields) => Self::Fields(fields.clone()),
            Self::With(f) => Self::With(Rc::clone(f)),
        }
    }
}

impl<T> fmt::Debug for SortKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(field) => f.debug_tuple("Field").field(field).finish(),
            Self::Fields(fields) => f.debug_tuple("Fields").field(fields).finish(),
            Self::With(_) => f.write_str("With(..)"),
        }
    }
}

impl<T> From<&str> for SortKey<T> {
    fn from(field: &str) -> Self {
        Self::Field(field.to_string())
    }
}

impl<T> From<String> for SortKey<T> {
    fn from(field: String) -> Self {
        Self::Field(field)
    }
}

impl<T> SortKey<T> {
    pub fn with(f: impl Fn(&T) -> SortValue + 'static) -> Self {
        Self::With(Rc::new(f))
    }
}

impl<T: SortField> SortKey<T> {
    pub fn extract(&self, item: &T) -> SortValue {
        match self {
            Self::Field(field) => item.sort_value(field),
            Self::Fields(fields) => SortValue::List(fields.iter().map(|f| item.sort_value(f)).collect()),
            Self::With(f) => f(item),
        }
    }
}

/// Stable sort of a copy of `items`. Equal keys keep their input order in
/// both directions.
pub fn sort_items<T: Clone + SortField>(items: &[T], key: &SortKey<T>, order: SortOrder) -> Vec<T> {
    let mut keyed: Vec<(SortValue, &T)> = items.iter().map(|item| (key.extract(item), item)).collect();
    unify_column(keyed.iter_mut().map(|(value, _)| value).collect());
    keyed.sort_by(|(a, _), (b, _)| match order {
        SortOrder::Asc => compare(a, b),
        SortOrder::Desc => compare(b, a),
    });
    keyed.into_iter().map(|(_, item)| item.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn null_sorts_first() {
        assert_eq!(compare(&SortValue::Null, &SortValue::from(-5.0)), Ordering::Less);
        assert_eq!(compare(&SortValue::from("a"), &SortValue::Null), Ordering::Greater);
    }

    #[test]
    fn text_is_case_insensitive_then_lowercase_first() {
        assert_eq!(compare(&"apple".into(), &"Banana".into()), Ordering::Less);
        assert_eq!(compare(&"a".into(), &"A".into()), Ordering::Less);
        assert_eq!(compare(&"A".into(), &"a".into()), Ordering::Greater);
    }

    #[test]
    fn mixed_text_and_number_compare_as_text() {
        assert_eq!(compare(&SortValue::from(10.0), &"9".into()), Ordering::Less);
        assert_eq!(compare(&SortValue::from(10.0), &SortValue::from(9.0)), Ordering::Greater);
    }

    #[test]
    fn nan_sorts_after_numbers() {
        assert_eq!(compare(&f64::NAN.into(), &SortValue::from(1e300)), Ordering::Greater);
        assert_eq!(compare(&SortValue::from(-1.0), &f64::NAN.into()), Ordering::Less);
        assert_eq!(compare(&f64::NAN.into(), &f64::NAN.into()), Ordering::Equal);
    }

    #[test]
    fn mixed_column_sorts_as_text() {
        let items: Vec<Value> = vec![
            json!({"k": 10}).into(),
            json!({"k": "5"}).into(),
            json!({"k": 9}).into(),
            json!({"k": null}).into(),
        ];
        let sorted = sort_items(&items, &SortKey::from("k"), SortOrder::Asc);
        let keys: Vec<_> = sorted.iter().map(|v| v.sort_value("k")).collect();
        assert_eq!(keys, vec![SortValue::Null, 10.0.into(), "5".into(), 9.0.into()]);
    }

    #[test]
    fn lists_compare_lexicographically() {
        let a = SortValue::List(vec![1.0.into(), "b".into()]);
        let b = SortValue::List(vec![1.0.into(), "c".into()]);
        assert_eq!(compare(&a, &b), Ordering::Less);
        assert_eq!(compare(&SortValue::List(vec![1.0.into()]), &a), Ordering::Less);
    }

    #[test]
    fn descending_keeps_ties_in_input_order() {
        let items: Vec<Value> = vec![
            json!({"k": 1, "id": "a"}).into(),
            json!({"k": 2, "id": "b"}).into(),
            json!({"k": 1, "id": "c"}).into(),
        ];
        let sorted = sort_items(&items, &SortKey::from("k"), SortOrder::Desc);
        let ids: Vec<_> = sorted.iter().map(|v| v.sort_value("id")).collect();
        assert_eq!(ids, vec!["b".into(), "a".into(), "c".into()]);
    }

    #[test]
    fn dotted_fields_reach_nested_values() {
        let item = Value::from(json!({"owner": {"name": "Zed"}}));
        assert_eq!(item.sort_value("owner.name"), SortValue::from("Zed"));
        assert_eq!(item.sort_value("owner.missing"), SortValue::Null);
    }
}
