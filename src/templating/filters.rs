//! Helper registry shared by every compiled template.
//!
//! Tera ships the usual string and collection filters (`escape`, `upper`,
//! `join`, `default`, ...). The registry adds the helpers directive
//! templates expect and lets embedding applications add their own before
//! the engine is built. It is read-only afterwards and installed into each
//! template's Tera instance when the template is compiled.
//!
//! Built-ins:
//!
//! - `e` filter: HTML-escapes any value, printed the way Tera prints it
//!   (Tera's own `escape` only accepts strings)
//! - `raw` filter: identity, marks the value as already-safe output
//! - `isset(map=..., key=...)` function: whether `map` is an object with `key`
//!
//! # Examples
//!
//! ```rust
//! use blade_engine::templating::FunctionRegistry;
//!
//! let registry = FunctionRegistry::builder()
//!     .filter("shout", |value: &tera::Value, _: &std::collections::HashMap<String, tera::Value>| {
//!         let text = value.as_str().unwrap_or_default();
//!         Ok(tera::Value::String(format!("{}!", text.to_uppercase())))
//!     })
//!     .build();
//! assert!(registry.has_filter("shout"));
//! assert!(registry.has_filter("raw"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tera::{Tera, Value};

/// Filter applied to every escaped echo.
pub const ESCAPE_FILTER: &str = "e";

/// Filters and functions installed into every compiled template.
#[derive(Clone)]
pub struct FunctionRegistry {
    filters: Vec<(String, Arc<dyn tera::Filter>)>,
    functions: Vec<(String, Arc<dyn tera::Function>)>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("filters", &self.filters.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("functions", &self.functions.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .finish()
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FunctionRegistry {
    /// Start from the built-in helpers.
    pub fn builder() -> FunctionRegistryBuilder {
        FunctionRegistryBuilder {
            registry: Self {
                filters: Vec::new(),
                functions: Vec::new(),
            },
        }
        .filter(ESCAPE_FILTER, escape_filter)
        .filter("raw", raw_filter)
        .function("isset", isset_function)
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.iter().any(|(n, _)| n == name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.iter().any(|(n, _)| n == name)
    }

    /// Register every helper on `tera`.
    pub fn install(&self, tera: &mut Tera) {
        for (name, filter) in &self.filters {
            tera.register_filter(name, SharedFilter(Arc::clone(filter)));
        }
        for (name, function) in &self.functions {
            tera.register_function(name, SharedFunction(Arc::clone(function)));
        }
    }
}

/// Collects helpers before the registry is frozen.
pub struct FunctionRegistryBuilder {
    registry: FunctionRegistry,
}

impl FunctionRegistryBuilder {
    /// Add (or replace) a filter.
    pub fn filter(mut self, name: &str, filter: impl tera::Filter + 'static) -> Self {
        let filter: Arc<dyn tera::Filter> = Arc::new(filter);
        self.registry.filters.retain(|(n, _)| n != name);
        self.registry.filters.push((name.to_string(), filter));
        self
    }

    /// Add (or replace) a function.
    pub fn function(mut self, name: &str, function: impl tera::Function + 'static) -> Self {
        let function: Arc<dyn tera::Function> = Arc::new(function);
        self.registry.functions.retain(|(n, _)| n != name);
        self.registry.functions.push((name.to_string(), function));
        self
    }

    pub fn build(self) -> FunctionRegistry {
        self.registry
    }
}

struct SharedFilter(Arc<dyn tera::Filter>);

impl tera::Filter for SharedFilter {
    fn filter(&self, value: &Value, args: &HashMap<String, Value>) -> tera::Result<Value> {
        self.0.filter(value, args)
    }

    fn is_safe(&self) -> bool {
        self.0.is_safe()
    }
}

struct SharedFunction(Arc<dyn tera::Function>);

impl tera::Function for SharedFunction {
    fn call(&self, args: &HashMap<String, Value>) -> tera::Result<Value> {
        self.0.call(args)
    }

    fn is_safe(&self) -> bool {
        self.0.is_safe()
    }
}

fn escape_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let mut text = String::new();
    display_value(value, &mut text);
    Ok(Value::String(tera::escape_html(&text)))
}

/// Append `value` as Tera writes it into template output.
fn display_value(value: &Value, out: &mut String) {
    match value {
        Value::String(s) => out.push_str(s),
        Value::Number(n) => match (n.as_i64(), n.as_u64(), n.as_f64()) {
            (Some(i), _, _) => out.push_str(&i.to_string()),
            (None, Some(u), _) => out.push_str(&u.to_string()),
            (None, None, Some(f)) => out.push_str(&f.to_string()),
            (None, None, None) => out.push_str(&n.to_string()),
        },
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Null => {}
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                display_value(item, out);
            }
            out.push(']');
        }
        Value::Object(_) => out.push_str("[object]"),
    }
}

fn raw_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    Ok(value.clone())
}

fn isset_function(args: &HashMap<String, Value>) -> tera::Result<Value> {
    let key = args
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| tera::Error::msg("isset requires a string `key` argument"))?;
    let present = args
        .get("map")
        .and_then(Value::as_object)
        .is_some_and(|map| map.contains_key(key));
    Ok(Value::Bool(present))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(registry: &FunctionRegistry, template: &str, data: Value) -> tera::Result<String> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        registry.install(&mut tera);
        tera.render_str(template, &tera::Context::from_serialize(&data)?)
    }

    #[test]
    fn test_raw_filter_is_identity() {
        let registry = FunctionRegistry::default();
        let out = render(&registry, "{{ html | raw }}", json!({"html": "<b>x</b>"})).unwrap();
        assert_eq!(out, "<b>x</b>");
    }

    #[test]
    fn test_escape_filter_accepts_any_value() {
        let registry = FunctionRegistry::default();
        let data = json!({
            "html": "<a href=\"/\">'x' & y</a>",
            "count": 3,
            "ok": true,
            "price": 1.5,
            "none": null,
            "list": [1, "<b>"],
            "obj": {"k": 1},
        });
        let out = render(
            &registry,
            "{{ html | e }}|{{ count | e }}|{{ ok | e }}|{{ price * 2 | e }}|{{ none | e }}|{{ list | e }}|{{ obj | e }}",
            data,
        )
        .unwrap();
        assert_eq!(
            out,
            "&lt;a href=&quot;&#x2F;&quot;&gt;&#x27;x&#x27; &amp; y&lt;&#x2F;a&gt;|3|true|3|\
             |[1, &lt;b&gt;]|[object]"
        );
    }

    #[test]
    fn test_escape_filter_matches_native_output_for_scalars() {
        let registry = FunctionRegistry::default();
        let data = json!({"n": -7, "f": 0.25, "big": 18446744073709551615u64, "t": false});
        let escaped = render(&registry, "{{ n | e }} {{ f | e }} {{ big | e }} {{ t | e }}", data.clone())
            .unwrap();
        let native = render(&registry, "{{ n }} {{ f }} {{ big }} {{ t }}", data).unwrap();
        assert_eq!(escaped, native);
    }

    #[test]
    fn test_isset() {
        let registry = FunctionRegistry::default();
        let data = json!({"user": {"name": "Ada"}});
        let out = render(
            &registry,
            "{{ isset(map=user, key='name') }}/{{ isset(map=user, key='age') }}",
            data,
        )
        .unwrap();
        assert_eq!(out, "true/false");
        assert!(render(&registry, "{{ isset(map=user) }}", json!({"user": {}})).is_err());
    }

    #[test]
    fn test_custom_filter_and_override() {
        let registry = FunctionRegistry::builder()
            .filter("shout", |value: &Value, _: &HashMap<String, Value>| {
                Ok(Value::String(format!("{}!", value.as_str().unwrap_or_default())))
            })
            .filter("raw", |_: &Value, _: &HashMap<String, Value>| {
                Ok(Value::String("replaced".into()))
            })
            .build();
        assert!(registry.has_function("isset"));
        let out = render(&registry, "{{ name | shout }} {{ name | raw }}", json!({"name": "hi"}))
            .unwrap();
        assert_eq!(out, "hi! replaced");
    }
}
