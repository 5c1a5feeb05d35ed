//! The converter table: named functions applied to matched entity values.

use std::sync::Arc;

use ahash::AHashMap;

use crate::recognition::Value;

/// The uniform shape of a converter: a list of matched values in, a list of
/// converted values out. The error string describes the offending value.
pub type ConverterFn = dyn Fn(&[Value]) -> Result<Vec<Value>, String> + Send + Sync;

/// A lookup table from converter name to callable.
///
/// [`ConverterTable::standard`] builds the default table with `int`,
/// `float`, `bool`, `lower` and `upper`. Caller tables can replace or
/// extend it per recognition call.
#[derive(Clone, Default)]
pub struct ConverterTable {
    converters: AHashMap<String, Arc<ConverterFn>>,
}

impl ConverterTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The default table.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.insert("int", |values| {
            values
                .iter()
                .map(|v| match v {
                    Value::Int(i) => Ok(Value::Int(*i)),
                    Value::Float(f) => Ok(Value::Int(*f as i64)),
                    Value::Str(s) => s
                        .trim()
                        .parse::<i64>()
                        .map(Value::Int)
                        .map_err(|_| format!("`{s}` is not an integer")),
                    Value::Bool(_) => Err("cannot convert a boolean to an integer".to_string()),
                })
                .collect()
        });
        table.insert("float", |values| {
            values
                .iter()
                .map(|v| match v {
                    Value::Float(f) => Ok(Value::Float(*f)),
                    Value::Int(i) => Ok(Value::Float(*i as f64)),
                    Value::Str(s) => s
                        .trim()
                        .parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| format!("`{s}` is not a number")),
                    Value::Bool(_) => Err("cannot convert a boolean to a number".to_string()),
                })
                .collect()
        });
        table.insert("bool", |values| {
            values
                .iter()
                .map(|v| match v.to_string().to_lowercase().as_str() {
                    "true" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
                    "false" | "no" | "off" | "0" => Ok(Value::Bool(false)),
                    other => Err(format!("`{other}` is not a boolean")),
                })
                .collect()
        });
        table.insert("lower", |values| {
            Ok(values
                .iter()
                .map(|v| Value::Str(v.to_string().to_lowercase()))
                .collect())
        });
        table.insert("upper", |values| {
            Ok(values
                .iter()
                .map(|v| Value::Str(v.to_string().to_uppercase()))
                .collect())
        });
        table
    }

    /// Registers a converter, replacing any previous one with that name.
    pub fn insert<F>(&mut self, name: impl Into<String>, converter: F)
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, String> + Send + Sync + 'static,
    {
        self.converters.insert(name.into(), Arc::new(converter));
    }

    /// Looks up a converter by name.
    pub fn get(&self, name: &str) -> Option<&Arc<ConverterFn>> {
        self.converters.get(name)
    }

    /// Copies every converter of `other` into this table, replacing
    /// same-named entries.
    pub fn extend_from(&mut self, other: &ConverterTable) {
        for (name, converter) in &other.converters {
            self.converters.insert(name.clone(), Arc::clone(converter));
        }
    }

    /// Registered converter names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.converters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for ConverterTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterTable")
            .field("converters", &self.names())
            .finish()
    }
}
