//! Runtime bindings injected into live scripts.
//!
//! Two small state containers back the bindings: a counter slice with
//! `increment`/`decrement` actions and a bear store with an `increase`
//! action. Each surface owns its own [`Store`].

use rustc_hash::FxHashMap;

/// State-changing action a button can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Increment,
    Decrement,
    Increase,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Increment => "increment",
            Action::Decrement => "decrement",
            Action::Increase => "increase",
        }
    }
}

/// A value produced by evaluating an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Str(String),
    Action(Action),
}

impl Value {
    /// Kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
            Value::Action(_) => "action",
        }
    }

    /// Text form of a displayable value. Actions are not displayable.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Int(n) => Some(n.to_string()),
            Value::Str(s) => Some(s.clone()),
            Value::Action(_) => None,
        }
    }
}

/// State containers behind the injected bindings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Store {
    /// Counter slice value.
    pub count: i64,
    /// Bear store value.
    pub bears: i64,
}

impl Store {
    /// Apply an action.
    pub fn dispatch(&mut self, action: Action) {
        match action {
            Action::Increment => self.count += 1,
            Action::Decrement => self.count -= 1,
            Action::Increase => self.bears += 1,
        }
        tracing::debug!("Dispatched {} -> {:?}", action.name(), self);
    }

    /// Look up an injected binding.
    pub fn binding(&self, name: &str) -> Option<Value> {
        let value = match name {
            "count" => Value::Int(self.count),
            "bears" => Value::Int(self.bears),
            "increment" => Value::Action(Action::Increment),
            "decrement" => Value::Action(Action::Decrement),
            "increase" => Value::Action(Action::Increase),
            _ => return None,
        };
        Some(value)
    }
}

/// Names visible to one evaluation: script locals shadow injected bindings.
pub struct Scope<'a> {
    store: &'a Store,
    locals: FxHashMap<String, Value>,
}

impl<'a> Scope<'a> {
    pub fn new(store: &'a Store) -> Self {
        Self {
            store,
            locals: FxHashMap::default(),
        }
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.locals.insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.locals
            .get(name)
            .cloned()
            .or_else(|| self.store.binding(name))
    }
}
