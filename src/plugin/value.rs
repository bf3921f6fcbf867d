//! Host-side representation of plugin values.
//!
//! Everything that crosses the script boundary is a [`PluginValue`]. The
//! conversion rules:
//!
//! - host → script: strings, numbers, booleans, lists and string-keyed maps
//!   map to their JavaScript counterparts; [`PluginValue::Nil`] is `null`.
//! - script → host: arrays become lists, plain objects become maps.
//!   Functions, symbols, references back to an enclosing object and
//!   anything nested too deeply become `Nil`. One conversion visits at most
//!   [`MAX_NODES`] values; the rest are `Nil` too.
//!
//! Reading a *field* is permissive: a missing or mistyped field yields the
//! zero value of what was asked for. Reading a *container* is strict; see
//! [`PluginValue::expect_list`] and [`PluginValue::expect_map`].

use std::collections::BTreeMap;

use rquickjs::{Array, Ctx, IntoJs, Object, Value};
use serde::Serialize;

use crate::error::{ProviderError, Result};

/// Nesting depth past which script values are cut off as `Nil`.
const MAX_DEPTH: usize = 64;

/// Values converted from one script value before the rest become `Nil`.
/// Shared sub-objects are converted once per reference, so this bounds the
/// work for graphs such as `a.x = b; a.y = b` repeated level after level.
pub const MAX_NODES: usize = 100_000;

static NIL: PluginValue = PluginValue::Nil;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PluginValue {
    #[default]
    Nil,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<PluginValue>),
    Map(BTreeMap<String, PluginValue>),
}

impl PluginValue {
    /// Convert any serialisable host value. Values serde cannot represent
    /// become `Nil`.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Self {
        serde_json::to_value(value).map_or(Self::Nil, Self::from)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "object",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    // ── script boundary ─────────────────────────────────────────────────

    pub fn to_js<'js>(&self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match self {
            Self::Nil => Ok(Value::new_null(ctx.clone())),
            Self::Bool(b) => Ok(Value::new_bool(ctx.clone(), *b)),
            Self::Number(n) => Ok(Value::new_number(ctx.clone(), *n)),
            Self::String(s) => s.as_str().into_js(ctx),
            Self::List(items) => {
                let array = Array::new(ctx.clone())?;
                for (i, item) in items.iter().enumerate() {
                    array.set(i, item.to_js(ctx)?)?;
                }
                Ok(array.into_value())
            }
            Self::Map(map) => {
                let object = Object::new(ctx.clone())?;
                for (key, item) in map {
                    object.set(key.as_str(), item.to_js(ctx)?)?;
                }
                Ok(object.into_value())
            }
        }
    }

    pub fn from_js<'js>(value: &Value<'js>) -> rquickjs::Result<Self> {
        FromJs {
            ancestors: Vec::new(),
            budget: MAX_NODES,
        }
        .convert(value)
    }

    /// Host JSON view, used for free-form records such as `get_info`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Nil => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) if is_integral(*n) => serde_json::Value::from(*n as i64),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => items.iter().map(Self::to_json).collect(),
            Self::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    // ── permissive field access ─────────────────────────────────────────

    /// Field of a map. Anything else, or a missing key, is `Nil`.
    pub fn get(&self, key: &str) -> &PluginValue {
        match self {
            Self::Map(map) => map.get(key).unwrap_or(&NIL),
            _ => &NIL,
        }
    }

    /// First of several candidate field names that is present and not nil.
    pub fn get_any(&self, keys: &[&str]) -> &PluginValue {
        keys.iter()
            .map(|k| self.get(k))
            .find(|v| !v.is_nil())
            .unwrap_or(&NIL)
    }

    /// Text form: strings as-is, numbers and booleans stringified, empty
    /// otherwise.
    pub fn as_text(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => b.to_string(),
            _ => String::new(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::String(s) => s.trim().parse().ok().filter(|n: &f64| n.is_finite()),
            _ => None,
        }
    }

    /// Non-negative integer, zero when absent or unusable.
    pub fn as_u32(&self) -> u32 {
        self.as_f64()
            .filter(|n| *n >= 0.0 && *n <= f64::from(u32::MAX))
            .map_or(0, |n| n as u32)
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    /// Items of a list, empty for anything else.
    pub fn items(&self) -> &[PluginValue] {
        match self {
            Self::List(items) => items,
            _ => &[],
        }
    }

    /// Non-empty text items of a list.
    pub fn text_list(&self) -> Vec<String> {
        self.items()
            .iter()
            .map(Self::as_text)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// String-valued entries of a map.
    pub fn text_map(&self) -> BTreeMap<String, String> {
        match self {
            Self::Map(map) => map
                .iter()
                .filter(|(_, v)| !v.is_nil())
                .map(|(k, v)| (k.clone(), v.as_text()))
                .collect(),
            _ => BTreeMap::new(),
        }
    }

    // ── strict container access ─────────────────────────────────────────

    /// A list returned by `function`. `Nil` counts as empty.
    pub fn expect_list(&self, function: &str) -> Result<&[PluginValue]> {
        match self {
            Self::List(items) => Ok(items),
            Self::Nil => Ok(&[]),
            other => Err(shape(function, "list", other)),
        }
    }

    /// An object returned by `function`.
    pub fn expect_map(&self, function: &str) -> Result<&BTreeMap<String, PluginValue>> {
        match self {
            Self::Map(map) => Ok(map),
            other => Err(shape(function, "object", other)),
        }
    }
}

pub(crate) fn shape(function: &str, expected: &'static str, found: &PluginValue) -> ProviderError {
    ProviderError::Shape {
        function: function.to_string(),
        expected,
        found: found.type_name(),
    }
}

fn is_integral(n: f64) -> bool {
    n.fract() == 0.0 && n.abs() < 1e15
}

fn format_number(n: f64) -> String {
    if is_integral(n) {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// One script → host conversion. `ancestors` holds the containers on the
/// path from the root to the value being converted.
struct FromJs<'js> {
    ancestors: Vec<Value<'js>>,
    budget: usize,
}

impl<'js> FromJs<'js> {
    fn convert(&mut self, value: &Value<'js>) -> rquickjs::Result<PluginValue> {
        if self.budget == 0 || self.ancestors.len() > MAX_DEPTH {
            return Ok(PluginValue::Nil);
        }
        self.budget -= 1;

        if let Some(b) = value.as_bool() {
            return Ok(PluginValue::Bool(b));
        }
        if let Some(n) = value.as_number() {
            return Ok(PluginValue::Number(n));
        }
        if let Some(s) = value.as_string() {
            return Ok(PluginValue::String(s.to_string()?));
        }
        if value.is_function() || value.is_promise() || !value.is_object() {
            return Ok(PluginValue::Nil);
        }
        if self.ancestors.contains(value) {
            return Ok(PluginValue::Nil);
        }

        self.ancestors.push(value.clone());
        let out = self.container(value);
        self.ancestors.pop();
        out
    }

    fn container(&mut self, value: &Value<'js>) -> rquickjs::Result<PluginValue> {
        // arrays are objects too, so test them first
        if let Some(array) = value.as_array() {
            let mut items = Vec::with_capacity(array.len());
            for item in array.iter::<Value>() {
                items.push(self.convert(&item?)?);
            }
            return Ok(PluginValue::List(items));
        }
        let mut map = BTreeMap::new();
        if let Some(object) = value.as_object() {
            for prop in object.props::<String, Value>() {
                let (key, item) = prop?;
                map.insert(key, self.convert(&item)?);
            }
        }
        Ok(PluginValue::Map(map))
    }
}

impl From<serde_json::Value> for PluginValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Nil,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Nil, Self::Number),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().map(Self::from).collect())
            }
            serde_json::Value::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&str> for PluginValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PluginValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}
