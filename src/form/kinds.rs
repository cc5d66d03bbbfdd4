//! Field-type policies.
//!
//! A field's kind decides its default value, how raw input is normalised,
//! what counts as empty, and what display text it derives after a render.

use std::fmt;
use std::rc::Rc;

use crate::form::value::Value;

/// State handed to [`FieldType::post_hook`] after every render.
#[derive(Debug, Clone, PartialEq)]
pub struct PostHook {
    pub value: Value,
    pub version: u64,
    /// Display text derived by the kind. Preset to the previous render's
    /// text, so a kind may skip recomputing when `version` is unchanged.
    pub display: Option<String>,
}

/// Capability interface for custom field kinds.
pub trait FieldType {
    /// Value used when neither the tree nor the caller provides one.
    fn default_value(&self) -> Option<Value> {
        None
    }

    fn normalize_value(&self, value: Value) -> Value {
        value
    }

    fn is_empty(&self, value: &Value) -> bool {
        default_is_empty(value)
    }

    fn post_hook(&self, hook: &mut PostHook) {
        let _ = hook;
    }
}

/// `null`, `""` and `[]` are empty.
pub fn default_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

#[derive(Clone, Default)]
pub enum FieldKind {
    #[default]
    Text,
    Numeric {
        min: Option<f64>,
        max: Option<f64>,
    },
    Toggle,
    Choice {
        choices: Vec<Value>,
        multiple: bool,
    },
    Date,
    Object,
    Array,
    Custom(Rc<dyn FieldType>),
}

impl FieldKind {
    pub fn numeric() -> Self {
        Self::Numeric { min: None, max: None }
    }

    pub fn choice(choices: impl IntoIterator<Item = impl Into<Value>>, multiple: bool) -> Self {
        Self::Choice {
            choices: choices.into_iter().map(Into::into).collect(),
            multiple,
        }
    }

    /// Object and array fields step aside for more specific fields bound to
    /// the same slot.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Object | Self::Array)
    }

    pub fn default_value(&self) -> Option<Value> {
        match self {
            Self::Object => Some(Value::object()),
            Self::Array => Some(Value::array()),
            Self::Custom(kind) => kind.default_value(),
            _ => None,
        }
    }

    pub fn normalize_value(&self, value: Value) -> Value {
        match self {
            Self::Text => match value {
                Value::Null => Value::String(String::new()),
                Value::String(_) => value,
                Value::Array(_) | Value::Object(_) => value,
                other => Value::String(other.to_display_string()),
            },
            Self::Numeric { min, max } => {
                let number = match value {
                    Value::Number(n) => Some(n),
                    Value::String(s) if s.trim().is_empty() => None,
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
                    _ => None,
                };
                match number {
                    Some(n) if !n.is_nan() => {
                        let n = min.map_or(n, |min| n.max(min));
                        Value::Number(max.map_or(n, |max| n.min(max)))
                    }
                    _ => Value::Null,
                }
            }
            Self::Toggle => Value::Bool(value.is_truthy()),
            Self::Choice { choices, multiple } => {
                if *multiple {
                    let items = match value {
                        Value::Array(items) => items,
                        Value::Null => Vec::new(),
                        other => vec![other],
                    };
                    Value::Array(items.into_iter().filter(|v| choices.contains(v)).collect())
                } else if choices.contains(&value) {
                    value
                } else {
                    Value::Null
                }
            }
            Self::Date => match value {
                Value::String(s) if s.trim().is_empty() => Value::Null,
                Value::String(s) => Value::String(s.trim().to_string()),
                Value::Number(n) => Value::Number(n),
                _ => Value::Null,
            },
            Self::Object => match value {
                Value::Object(_) => value,
                _ => Value::object(),
            },
            Self::Array => match value {
                Value::Array(_) => value,
                _ => Value::array(),
            },
            Self::Custom(kind) => kind.normalize_value(value),
        }
    }

    pub fn is_empty(&self, value: &Value) -> bool {
        match self {
            Self::Toggle => matches!(value, Value::Null | Value::Bool(false)),
            Self::Numeric { .. } => match value {
                Value::Number(n) => n.is_nan(),
                other => default_is_empty(other),
            },
            Self::Object => value.as_object().map_or(true, |map| map.is_empty()),
            Self::Custom(kind) => kind.is_empty(value),
            _ => default_is_empty(value),
        }
    }

    pub fn post_hook(&self, hook: &mut PostHook) {
        let text = match self {
            Self::Custom(kind) => {
                kind.post_hook(hook);
                return;
            }
            Self::Object | Self::Array => return,
            Self::Toggle => hook.value.is_truthy().to_string(),
            Self::Choice { multiple: true, .. } => hook
                .value
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .map(Value::to_display_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_default(),
            _ => match &hook.value {
                Value::Null => String::new(),
                other => other.to_display_string(),
            },
        };
        hook.display = Some(text);
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Numeric { .. } => "numeric",
            Self::Toggle => "toggle",
            Self::Choice { .. } => "choice",
            Self::Date => "date",
            Self::Object => "object",
            Self::Array => "array",
            Self::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric { min, max } => f
                .debug_struct("Numeric")
                .field("min", min)
                .field("max", max)
                .finish(),
            Self::Choice { choices, multiple } => f
                .debug_struct("Choice")
                .field("choices", choices)
                .field("multiple", multiple)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}
