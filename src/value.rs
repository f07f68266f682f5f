use std::fmt;
use std::rc::Rc;

use serde_json::json;

use crate::ast::FuncDecl;
use crate::types::{BasicType, FunctionType, Method, StructType, Type};

/// Identifies one binding slot. `generation` tells apart scopes that reuse
/// the same stack index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId {
    pub scope: usize,
    pub generation: u64,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Index(usize),
    Field(usize),
}

/// A storage location: a binding slot plus a path into aggregates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub slot: SlotId,
    pub path: Vec<Step>,
}

impl Place {
    pub fn root(slot: SlotId) -> Self {
        Self {
            slot,
            path: Vec::new(),
        }
    }

    pub fn index(&self, i: usize) -> Self {
        let mut p = self.clone();
        p.path.push(Step::Index(i));
        p
    }

    pub fn field(&self, i: usize) -> Self {
        let mut p = self.clone();
        p.path.push(Step::Field(i));
        p
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Cout,
    Cin,
    Endl,
}

pub type NativeFn = fn(&[Value]) -> Option<Value>;

#[derive(Debug)]
pub struct Callable {
    pub name: String,
    pub ty: Rc<FunctionType>,
    pub ptr: FuncPtr,
}

#[derive(Debug)]
pub enum FuncPtr {
    /// Declared in the program; invoking pushes a scope and runs the body.
    User(Rc<FuncDecl>),
    Native(NativeFn),
    /// A native method closed over its receiver.
    Bound { method: Method, receiver: Receiver },
}

#[derive(Debug)]
pub enum Receiver {
    Place(Place),
    /// Receiver without storage (e.g. a function result); changes are dropped.
    Temp(Value),
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    Char(char),
    String(String),
    Array { elem: Rc<Type>, items: Vec<Value> },
    Vector { elem: Rc<Type>, items: Vec<Value> },
    Struct { def: Rc<StructType>, fields: Vec<Value> },
    Function(Rc<Callable>),
    Reference(Place),
    Stream(Stream),
}

impl Value {
    pub fn type_of(&self) -> Option<Type> {
        Some(match self {
            Value::Bool(_) => Type::Basic(BasicType::Bool),
            Value::Int(_) => Type::Basic(BasicType::Int),
            Value::Float(_) => Type::Basic(BasicType::Float),
            Value::Double(_) => Type::Basic(BasicType::Double),
            Value::Char(_) => Type::Basic(BasicType::Char),
            Value::String(_) => Type::Basic(BasicType::String),
            Value::Array { elem, items } => Type::Array(elem.clone(), items.len()),
            Value::Vector { elem, .. } => Type::Vector(elem.clone()),
            Value::Struct { def, .. } => Type::Struct(def.clone()),
            Value::Function(c) => Type::Function(c.ty.clone()),
            Value::Null | Value::Reference(_) | Value::Stream(_) => return None,
        })
    }

    pub fn type_str(&self) -> String {
        match self {
            Value::Null => "void".to_string(),
            Value::Reference(_) => "reference".to_string(),
            Value::Stream(Stream::Cout) => "ostream".to_string(),
            Value::Stream(Stream::Cin) => "istream".to_string(),
            Value::Stream(Stream::Endl) => "endl".to_string(),
            other => other
                .type_of()
                .map(|t| t.type_str())
                .unwrap_or_default(),
        }
    }

    /// Rendering used in step descriptions: strings and chars quoted, bools spelled out.
    pub fn repr(&self) -> String {
        match self {
            Value::String(s) => format!("\"{}\"", s),
            Value::Char(c) => format!("'{}'", c),
            Value::Bool(b) => b.to_string(),
            Value::Array { items, .. } | Value::Vector { items, .. } => {
                let parts: Vec<String> = items.iter().map(|v| v.repr()).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Struct { fields, .. } => {
                let parts: Vec<String> = fields.iter().map(|v| v.repr()).collect();
                format!("{{{}}}", parts.join(", "))
            }
            other => other.to_string(),
        }
    }

    /// JSON view for environment display. References are resolved by the caller.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => json!(b),
            Value::Int(i) => json!(i),
            Value::Float(f) => json!(f),
            Value::Double(d) => json!(d),
            Value::Char(c) => json!(c.to_string()),
            Value::String(s) => json!(s),
            Value::Array { items, .. } | Value::Vector { items, .. } => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect())
            }
            Value::Struct { def, fields } => {
                let mut map = serde_json::Map::new();
                for ((name, _), v) in def.fields.iter().zip(fields) {
                    map.insert(name.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
            Value::Function(c) => json!(format!("<function {}>", c.name)),
            Value::Reference(_) => json!("<reference>"),
            Value::Stream(_) => json!(self.type_str()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array { items: a, .. }, Value::Array { items: b, .. }) => a == b,
            (Value::Vector { items: a, .. }, Value::Vector { items: b, .. }) => a == b,
            (Value::Struct { def: da, fields: a }, Value::Struct { def: db, fields: b }) => {
                Rc::ptr_eq(da, db) && a == b
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Reference(a), Value::Reference(b)) => a == b,
            (Value::Stream(a), Value::Stream(b)) => a == b,
            _ => false,
        }
    }
}

/// iostream rendering: `%g` floats, bools as 1/0, `endl` as a newline.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", if *b { 1 } else { 0 }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_g(*x as f64)),
            Value::Double(x) => f.write_str(&format_g(*x)),
            Value::Char(c) => write!(f, "{}", c),
            Value::String(s) => f.write_str(s),
            Value::Array { items, .. } | Value::Vector { items, .. } => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Struct { fields, .. } => {
                let parts: Vec<String> = fields.iter().map(|v| v.to_string()).collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
            Value::Function(c) => write!(f, "<function {}>", c.name),
            Value::Reference(_) => f.write_str("<reference>"),
            Value::Stream(Stream::Endl) => f.write_str("\n"),
            Value::Stream(_) => Ok(()),
        }
    }
}

/// C `%g` with 6 significant digits.
pub fn format_g(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0" } else { "0" }.to_string();
    }
    let sci = format!("{:.5e}", x);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => return sci,
    };
    if !(-4..6).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(mantissa), sign, exp.abs())
    } else {
        let fixed = format!("{:.*}", (5 - exp) as usize, x);
        trim_fraction(&fixed).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn g_format_matches_iostream_defaults() {
        assert_eq!(format_g(3.14), "3.14");
        assert_eq!(format_g(2.0), "2");
        assert_eq!(format_g(1.0 / 3.0), "0.333333");
        assert_eq!(format_g(100000.0), "100000");
        assert_eq!(format_g(1234567.0), "1.23457e+06");
        assert_eq!(format_g(0.0001), "0.0001");
        assert_eq!(format_g(0.00001234), "1.234e-05");
        assert_eq!(format_g(-2.5), "-2.5");
        assert_eq!(Value::Float(0.1).to_string(), "0.1");
    }

    #[test]
    fn display_and_repr() {
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::Bool(true).repr(), "true");
        assert_eq!(Value::String("hi".into()).repr(), "\"hi\"");
        assert_eq!(Value::Stream(Stream::Endl).to_string(), "\n");
        let v = Value::Vector {
            elem: Rc::new(Type::int()),
            items: vec![Value::Int(1), Value::Int(2)],
        };
        assert_eq!(v.to_string(), "{1, 2}");
        assert_eq!(v.type_str(), "vector<int>");
    }

    #[test]
    fn places_extend_paths() {
        let slot = SlotId {
            scope: 1,
            generation: 4,
            index: 0,
        };
        let p = Place::root(slot).index(2).field(1);
        assert_eq!(p.path, vec![Step::Index(2), Step::Field(1)]);
    }
}
