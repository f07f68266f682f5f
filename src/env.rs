use std::collections::HashMap;

use serde::Serialize;
use tracing::{trace, warn};

use crate::error::{ErrorKind, EvalError, EvalResult};
use crate::translate::Translator;
use crate::value::{Place, SlotId, Step, Value};

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub hidden: bool,
    pub is_const: bool,
}

#[derive(Debug)]
pub struct Scope {
    pub name: String,
    pub active: bool,
    generation: u64,
    names: HashMap<String, usize>,
    slots: Vec<(String, Binding)>,
}

impl Scope {
    fn new(name: &str, generation: u64) -> Self {
        Self {
            name: name.to_string(),
            active: true,
            generation,
            names: HashMap::new(),
            slots: Vec::new(),
        }
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.slots.iter().map(|(n, b)| (n.as_str(), b))
    }
}

/// Serialized view of one scope for display.
#[derive(Debug, Serialize)]
pub struct ScopeView {
    pub name: String,
    pub active: bool,
    pub bindings: Vec<BindingView>,
}

#[derive(Debug, Serialize)]
pub struct BindingView {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub value: serde_json::Value,
}

/// Stack of scopes. Index 0 is the global scope and is never popped.
#[derive(Debug)]
pub struct Environment {
    scopes: Vec<Scope>,
    next_generation: u64,
    tr: Translator,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::with_translator(Translator::default())
    }

    pub fn with_translator(tr: Translator) -> Self {
        Self {
            scopes: vec![Scope::new("<global>", 0)],
            next_generation: 1,
            tr,
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn push(&mut self, name: &str) {
        for s in &mut self.scopes {
            s.active = false;
        }
        trace!(scope = name, depth = self.scopes.len() + 1, "push scope");
        self.scopes.push(Scope::new(name, self.next_generation));
        self.next_generation += 1;
    }

    pub fn pop(&mut self) {
        if self.scopes.len() == 1 {
            warn!("attempt to pop the global scope ignored");
            return;
        }
        if let Some(s) = self.scopes.pop() {
            trace!(scope = %s.name, depth = self.scopes.len(), "pop scope");
        }
        if let Some(top) = self.scopes.last_mut() {
            top.active = true;
        }
    }

    /// Bind `id` in the innermost scope, overwriting a previous binding there.
    pub fn set(&mut self, id: &str, value: Value, hidden: bool) {
        self.declare(
            id,
            Binding {
                value,
                hidden,
                is_const: false,
            },
        )
    }

    pub fn declare(&mut self, id: &str, binding: Binding) {
        let Some(scope) = self.scopes.last_mut() else {
            return;
        };
        match scope.names.get(id) {
            Some(&i) => scope.slots[i].1 = binding,
            None => {
                scope.names.insert(id.to_string(), scope.slots.len());
                scope.slots.push((id.to_string(), binding));
            }
        }
    }

    /// Innermost-first lookup.
    pub fn lookup(&self, id: &str) -> Option<SlotId> {
        self.scopes.iter().enumerate().rev().find_map(|(i, s)| {
            s.names.get(id).map(|&index| SlotId {
                scope: i,
                generation: s.generation,
                index,
            })
        })
    }

    pub fn get(&self, id: &str) -> Option<&Value> {
        let slot = self.lookup(id)?;
        self.binding(&slot).ok().map(|b| &b.value)
    }

    pub fn binding(&self, slot: &SlotId) -> EvalResult<&Binding> {
        let tr = self.tr;
        match self.scopes.get(slot.scope) {
            Some(s) if s.generation == slot.generation => s
                .slots
                .get(slot.index)
                .map(|(_, b)| b)
                .ok_or_else(|| dangling(&tr)),
            _ => Err(dangling(&tr)),
        }
    }

    fn binding_mut(&mut self, slot: &SlotId) -> EvalResult<&mut Binding> {
        let tr = self.tr;
        match self.scopes.get_mut(slot.scope) {
            Some(s) if s.generation == slot.generation => s
                .slots
                .get_mut(slot.index)
                .map(|(_, b)| b)
                .ok_or_else(|| dangling(&tr)),
            _ => Err(dangling(&tr)),
        }
    }

    pub fn slot_name(&self, slot: &SlotId) -> Option<&str> {
        let s = self.scopes.get(slot.scope)?;
        s.slots.get(slot.index).map(|(n, _)| n.as_str())
    }

    pub fn is_const(&self, place: &Place) -> EvalResult<bool> {
        Ok(self.binding(&place.slot)?.is_const)
    }

    pub fn read(&self, place: &Place) -> EvalResult<&Value> {
        let tr = self.tr;
        let mut v = &self.binding(&place.slot)?.value;
        for step in &place.path {
            v = match (v, step) {
                (Value::Array { items, .. } | Value::Vector { items, .. }, Step::Index(i)) => {
                    items.get(*i).ok_or_else(|| out_of_range(&tr, *i))?
                }
                (Value::Struct { fields, .. }, Step::Field(i)) => {
                    fields.get(*i).ok_or_else(|| dangling(&tr))?
                }
                _ => return Err(dangling(&tr)),
            };
        }
        Ok(v)
    }

    pub fn get_mut(&mut self, place: &Place) -> EvalResult<&mut Value> {
        let tr = self.tr;
        let mut v = &mut self.binding_mut(&place.slot)?.value;
        for step in &place.path {
            v = match (v, step) {
                (Value::Array { items, .. } | Value::Vector { items, .. }, Step::Index(i)) => {
                    items.get_mut(*i).ok_or_else(|| out_of_range(&tr, *i))?
                }
                (Value::Struct { fields, .. }, Step::Field(i)) => {
                    fields.get_mut(*i).ok_or_else(|| dangling(&tr))?
                }
                _ => return Err(dangling(&tr)),
            };
        }
        Ok(v)
    }

    pub fn write(&mut self, place: &Place, value: Value) -> EvalResult<()> {
        *self.get_mut(place)? = value;
        Ok(())
    }

    /// Non-global scopes with their visible bindings, outermost first.
    pub fn snapshot(&self) -> Vec<ScopeView> {
        self.scopes
            .iter()
            .skip(1)
            .map(|s| ScopeView {
                name: s.name.clone(),
                active: s.active,
                bindings: s
                    .bindings()
                    .filter(|(_, b)| !b.hidden)
                    .map(|(name, b)| {
                        let shown = match &b.value {
                            Value::Reference(p) => self.read(p).unwrap_or(&b.value),
                            v => v,
                        };
                        BindingView {
                            name: name.to_string(),
                            ty: shown.type_str(),
                            value: shown.to_json(),
                        }
                    })
                    .collect(),
            })
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or_default()
    }
}


fn dangling(tr: &Translator) -> EvalError {
    EvalError::new(
        ErrorKind::DanglingReference,
        tr.tr("The variable referred to no longer exists.", &[]),
    )
}

fn out_of_range(tr: &Translator, i: usize) -> EvalError {
    EvalError::new(
        ErrorKind::IndexOutOfRange,
        tr.tr("Cell %d does not exist.", &[&i]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;
    use std::rc::Rc;

    #[test]
    fn shadowing_and_pop() {
        let mut env = Environment::new();
        env.set("x", Value::Int(1), false);
        env.push("f");
        env.set("x", Value::Int(2), false);
        assert_eq!(env.get("x"), Some(&Value::Int(2)));
        env.pop();
        assert_eq!(env.get("x"), Some(&Value::Int(1)));
        assert_eq!(env.depth(), 1);
    }

    #[test]
    fn exactly_one_active_scope() {
        let mut env = Environment::new();
        env.push("main");
        env.push("<block>");
        let active: Vec<_> = env.scopes().iter().filter(|s| s.active).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "<block>");
        env.pop();
        assert!(env.scopes()[1].active);
        assert!(!env.scopes()[0].active);
    }

    #[test]
    fn global_scope_is_never_popped() {
        let mut env = Environment::new();
        env.pop();
        assert_eq!(env.depth(), 1);
        assert!(env.scopes()[0].active);
    }

    #[test]
    fn redeclaration_overwrites_in_same_scope() {
        let mut env = Environment::new();
        env.set("a", Value::Int(1), false);
        env.set("a", Value::Int(5), false);
        assert_eq!(env.get("a"), Some(&Value::Int(5)));
        assert_eq!(env.scopes()[0].bindings().count(), 1);
    }

    #[test]
    fn writes_through_paths() {
        let mut env = Environment::new();
        let arr = Type::Array(Rc::new(Type::int()), 3).create();
        env.set("a", arr, false);
        let place = Place::root(env.lookup("a").unwrap()).index(1);
        env.write(&place, Value::Int(9)).unwrap();
        assert_eq!(env.read(&place).unwrap(), &Value::Int(9));
        let bad = Place::root(env.lookup("a").unwrap()).index(3);
        assert_eq!(env.read(&bad).unwrap_err().kind, ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn stale_slots_are_detected() {
        let mut env = Environment::new();
        env.push("f");
        env.set("x", Value::Int(1), false);
        let slot = env.lookup("x").unwrap();
        env.pop();
        env.push("g");
        env.set("y", Value::Int(2), false);
        let err = env.read(&Place::root(slot)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DanglingReference);
    }

    #[test]
    fn snapshot_skips_global_and_hidden() {
        let mut env = Environment::new();
        env.set("g", Value::Int(1), false);
        env.push("main");
        env.set("cout", Value::Int(0), true);
        env.set("n", Value::Int(3), false);
        let slot = env.lookup("n").unwrap();
        env.set("r", Value::Reference(Place::root(slot)), false);
        let json = env.to_json();
        assert_eq!(
            json,
            serde_json::json!([{
                "name": "main",
                "active": true,
                "bindings": [
                    {"name": "n", "type": "int", "value": 3},
                    {"name": "r", "type": "int", "value": 3}
                ]
            }])
        );
    }
}
