use std::collections::HashMap;
use std::rc::Rc;

use tracing::warn;

use crate::ast::TypeSpec;
use crate::error::{ErrorKind, EvalError, EvalResult};
use crate::translate::Translator;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicType {
    Bool,
    Int,
    Float,
    Double,
    Char,
    String,
}

impl BasicType {
    pub fn name(self) -> &'static str {
        match self {
            BasicType::Bool => "bool",
            BasicType::Int => "int",
            BasicType::Float => "float",
            BasicType::Double => "double",
            BasicType::Char => "char",
            BasicType::String => "string",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "bool" => BasicType::Bool,
            "int" => BasicType::Int,
            "float" => BasicType::Float,
            "double" => BasicType::Double,
            "char" => BasicType::Char,
            "string" => BasicType::String,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone)]
pub enum Type {
    Basic(BasicType),
    Array(Rc<Type>, usize),
    Vector(Rc<Type>),
    Struct(Rc<StructType>),
    Function(Rc<FunctionType>),
}

#[derive(Debug)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

impl StructType {
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }
}

/// Signature of a callable. `ret == None` means `void`.
#[derive(Debug)]
pub struct FunctionType {
    pub ret: Option<Type>,
    pub params: Vec<ParamType>,
}

#[derive(Debug, Clone)]
pub struct ParamType {
    pub ty: Type,
    pub by_ref: bool,
}

impl FunctionType {
    pub fn type_str(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.by_ref {
                    format!("{}&", p.ty.type_str())
                } else {
                    p.ty.type_str()
                }
            })
            .collect();
        let ret = self
            .ret
            .as_ref()
            .map(|t| t.type_str())
            .unwrap_or_else(|| "void".to_string());
        format!("{}({})", ret, params.join(","))
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.type_str() == other.type_str()
    }
}

impl Type {
    pub fn int() -> Type {
        Type::Basic(BasicType::Int)
    }

    /// Canonical spelling used for every type identity check.
    pub fn type_str(&self) -> String {
        match self {
            Type::Basic(b) => b.name().to_string(),
            Type::Array(elem, n) => format!("{}[{}]", elem.type_str(), n),
            Type::Vector(elem) => format!("vector<{}>", elem.type_str()),
            Type::Struct(s) => s.name.clone(),
            Type::Function(f) => f.type_str(),
        }
    }

    /// Zero value of this type.
    pub fn create(&self) -> Value {
        match self {
            Type::Basic(BasicType::Bool) => Value::Bool(false),
            Type::Basic(BasicType::Int) => Value::Int(0),
            Type::Basic(BasicType::Float) => Value::Float(0.0),
            Type::Basic(BasicType::Double) => Value::Double(0.0),
            Type::Basic(BasicType::Char) => Value::Char('\0'),
            Type::Basic(BasicType::String) => Value::String(String::new()),
            Type::Array(elem, n) => Value::Array {
                elem: elem.clone(),
                items: (0..*n).map(|_| elem.create()).collect(),
            },
            Type::Vector(elem) => Value::Vector {
                elem: elem.clone(),
                items: Vec::new(),
            },
            Type::Struct(def) => Value::Struct {
                def: def.clone(),
                fields: def.fields.iter().map(|(_, t)| t.create()).collect(),
            },
            Type::Function(_) => Value::Null,
        }
    }

    /// Implicit conversion of `v` into this type. Numbers convert freely among
    /// int/float/double; everything else needs an exact type match.
    pub fn convert(&self, v: &Value) -> Option<Value> {
        let basic = match self {
            Type::Basic(b) => *b,
            _ => return (v.type_str() == self.type_str()).then(|| v.clone()),
        };
        match (basic, v) {
            (BasicType::Int, Value::Int(i)) => Some(Value::Int(*i)),
            (BasicType::Int, Value::Float(f)) => Some(Value::Int(*f as i32)),
            (BasicType::Int, Value::Double(d)) => Some(Value::Int(*d as i32)),
            (BasicType::Float, Value::Int(i)) => Some(Value::Float(*i as f32)),
            (BasicType::Float, Value::Float(f)) => Some(Value::Float(*f)),
            (BasicType::Float, Value::Double(d)) => Some(Value::Float(*d as f32)),
            (BasicType::Double, Value::Int(i)) => Some(Value::Double(*i as f64)),
            (BasicType::Double, Value::Float(f)) => Some(Value::Double(*f as f64)),
            (BasicType::Double, Value::Double(d)) => Some(Value::Double(*d)),
            (BasicType::Bool, Value::Bool(b)) => Some(Value::Bool(*b)),
            (BasicType::Char, Value::Char(c)) => Some(Value::Char(*c)),
            (BasicType::String, Value::String(s)) => Some(Value::String(s.clone())),
            _ => None,
        }
    }

    /// Object construction `T x(args...)`. Vectors collect their arguments as
    /// elements; basic types take at most one argument.
    pub fn construct(&self, args: Vec<Value>, tr: &Translator) -> EvalResult<Value> {
        match self {
            Type::Vector(elem) => {
                let mut items = Vec::with_capacity(args.len());
                for a in &args {
                    items.push(elem.convert(a).ok_or_else(|| {
                        conversion_error(tr, &elem.type_str(), &a.type_str())
                    })?);
                }
                Ok(Value::Vector {
                    elem: elem.clone(),
                    items,
                })
            }
            Type::Basic(_) if args.is_empty() => Ok(self.create()),
            Type::Basic(_) if args.len() == 1 => self
                .convert(&args[0])
                .ok_or_else(|| conversion_error(tr, &self.type_str(), &args[0].type_str())),
            _ => Err(EvalError::new(
                ErrorKind::Unsupported,
                tr.tr(
                    "The type '%s' cannot be constructed with arguments.",
                    &[&self.type_str()],
                ),
            )),
        }
    }

    /// Native method table for bound-method field access.
    pub fn method(&self, name: &str) -> Option<Method> {
        let m = match (self, name) {
            (Type::Vector(_), "size") => Method::Size,
            (Type::Vector(_), "empty") => Method::Empty,
            (Type::Vector(_), "push_back") => Method::PushBack,
            (Type::Vector(_), "pop_back") => Method::PopBack,
            (Type::Vector(_), "back") => Method::Back,
            (Type::Vector(_), "front") => Method::Front,
            (Type::Vector(_), "clear") => Method::Clear,
            (Type::Vector(_), "resize") => Method::Resize,
            (Type::Basic(BasicType::String), "size") => Method::Size,
            (Type::Basic(BasicType::String), "length") => Method::Length,
            (Type::Basic(BasicType::String), "empty") => Method::Empty,
            _ => return None,
        };
        Some(m)
    }
}

pub(crate) fn conversion_error(tr: &Translator, to: &str, from: &str) -> EvalError {
    EvalError::new(
        ErrorKind::ConversionFailure,
        tr.tr(
            "The assignment cannot be done because the types are incompatible ('%s' and '%s').",
            &[&to, &from],
        ),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Size,
    Length,
    Empty,
    PushBack,
    PopBack,
    Back,
    Front,
    Clear,
    Resize,
}

impl Method {
    pub fn name(self) -> &'static str {
        match self {
            Method::Size => "size",
            Method::Length => "length",
            Method::Empty => "empty",
            Method::PushBack => "push_back",
            Method::PopBack => "pop_back",
            Method::Back => "back",
            Method::Front => "front",
            Method::Clear => "clear",
            Method::Resize => "resize",
        }
    }

    pub fn signature(self, receiver: &Type) -> FunctionType {
        let elem = match receiver {
            Type::Vector(elem) => Some(elem.as_ref().clone()),
            _ => None,
        };
        let by_value = |ty: Type| ParamType { ty, by_ref: false };
        let (ret, params) = match self {
            Method::Size | Method::Length => (Some(Type::int()), vec![]),
            Method::Empty => (Some(Type::Basic(BasicType::Bool)), vec![]),
            Method::PushBack => (None, elem.into_iter().map(by_value).collect()),
            Method::PopBack | Method::Clear => (None, vec![]),
            Method::Back | Method::Front => (elem, vec![]),
            Method::Resize => (None, vec![by_value(Type::int())]),
        };
        FunctionType { ret, params }
    }

    /// Run the method on the receiver's storage. Arguments are already checked
    /// against `signature`.
    pub fn apply(
        self,
        recv: &mut Value,
        args: Vec<Value>,
        tr: &Translator,
    ) -> EvalResult<Option<Value>> {
        if let Value::String(s) = recv {
            return Ok(match self {
                Method::Size | Method::Length => Some(Value::Int(s.len() as i32)),
                Method::Empty => Some(Value::Bool(s.is_empty())),
                _ => None,
            });
        }
        let Value::Vector { elem, items } = recv else {
            return Ok(None);
        };
        let empty = || EvalError::new(ErrorKind::IndexOutOfRange, tr.tr("The vector is empty.", &[]));
        let result = match self {
            Method::Size | Method::Length => Some(Value::Int(items.len() as i32)),
            Method::Empty => Some(Value::Bool(items.is_empty())),
            Method::PushBack => {
                items.extend(args);
                None
            }
            Method::PopBack => {
                items.pop().ok_or_else(empty)?;
                None
            }
            Method::Back => Some(items.last().cloned().ok_or_else(empty)?),
            Method::Front => Some(items.first().cloned().ok_or_else(empty)?),
            Method::Clear => {
                items.clear();
                None
            }
            Method::Resize => {
                let n = match args.first() {
                    Some(Value::Int(n)) if *n >= 0 => *n as usize,
                    _ => {
                        return Err(EvalError::new(
                            ErrorKind::ArraySize,
                            tr.tr("The size of an array must be a positive integer.", &[]),
                        ))
                    }
                };
                items.resize_with(n, || elem.create());
                None
            }
        };
        Ok(result)
    }
}

/// Named types known to one run. Struct types are registered once.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    structs: HashMap<String, Rc<StructType>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a type specifier, ignoring `const` and `&`. `void` resolves to `None`.
    pub fn get(&self, spec: &TypeSpec) -> Option<Type> {
        if let Some(b) = BasicType::from_name(&spec.name) {
            return spec.args.is_empty().then_some(Type::Basic(b));
        }
        match (spec.name.as_str(), spec.args.as_slice()) {
            ("vector", [elem]) => Some(Type::Vector(Rc::new(self.get(elem)?))),
            (name, []) => self.structs.get(name).map(|s| Type::Struct(s.clone())),
            _ => None,
        }
    }

    pub fn register(&mut self, st: StructType) -> Rc<StructType> {
        if let Some(existing) = self.structs.get(&st.name) {
            warn!(name = %st.name, "struct already registered, keeping the first definition");
            return existing.clone();
        }
        let rc = Rc::new(st);
        self.structs.insert(rc.name.clone(), rc.clone());
        rc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    fn spec(name: &str, args: Vec<TypeSpec>) -> TypeSpec {
        TypeSpec {
            name: name.to_string(),
            args,
            is_const: false,
            reference: false,
            span: Span::default(),
        }
    }

    fn point(reg: &mut TypeRegistry) -> Rc<StructType> {
        reg.register(StructType {
            name: "Point".to_string(),
            fields: vec![
                ("x".to_string(), Type::int()),
                ("y".to_string(), Type::Basic(BasicType::Double)),
            ],
        })
    }

    #[test]
    fn zero_values() {
        assert_eq!(Type::int().create(), Value::Int(0));
        assert_eq!(
            Type::Basic(BasicType::String).create(),
            Value::String(String::new())
        );
        let arr = Type::Array(Rc::new(Type::Basic(BasicType::Bool)), 3).create();
        match arr {
            Value::Array { items, .. } => assert_eq!(items, vec![Value::Bool(false); 3]),
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn numeric_conversions_truncate_and_widen() {
        assert_eq!(Type::int().convert(&Value::Double(3.9)), Some(Value::Int(3)));
        assert_eq!(Type::int().convert(&Value::Double(-3.9)), Some(Value::Int(-3)));
        assert_eq!(
            Type::Basic(BasicType::Double).convert(&Value::Int(2)),
            Some(Value::Double(2.0))
        );
        assert_eq!(Type::int().convert(&Value::Bool(true)), None);
        assert_eq!(
            Type::Basic(BasicType::String).convert(&Value::Char('a')),
            None
        );
    }

    #[test]
    fn aggregates_convert_only_on_exact_type() {
        let mut reg = TypeRegistry::new();
        let p = point(&mut reg);
        let ty = Type::Struct(p);
        let v = ty.create();
        assert_eq!(ty.convert(&v), Some(v.clone()));
        let vi = Type::Vector(Rc::new(Type::int()));
        let vd = Type::Vector(Rc::new(Type::Basic(BasicType::Double)));
        assert!(vd.convert(&vi.create()).is_none());
    }

    #[test]
    fn construct_vector_collects_arguments() {
        let tr = Translator::default();
        let ty = Type::Vector(Rc::new(Type::Basic(BasicType::Double)));
        let v = ty
            .construct(vec![Value::Int(1), Value::Double(2.5)], &tr)
            .unwrap();
        match v {
            Value::Vector { items, .. } => {
                assert_eq!(items, vec![Value::Double(1.0), Value::Double(2.5)])
            }
            other => panic!("expected vector, got {:?}", other),
        }
    }

    #[test]
    fn construct_struct_is_unsupported() {
        let tr = Translator::default();
        let mut reg = TypeRegistry::new();
        let ty = Type::Struct(point(&mut reg));
        let err = ty.construct(vec![Value::Int(1)], &tr).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unsupported);
    }

    #[test]
    fn registry_resolves_nested_and_registers_once() {
        let mut reg = TypeRegistry::new();
        let first = point(&mut reg);
        let again = reg.register(StructType {
            name: "Point".to_string(),
            fields: vec![],
        });
        assert!(Rc::ptr_eq(&first, &again));
        let t = reg
            .get(&spec("vector", vec![spec("vector", vec![spec("int", vec![])])]))
            .unwrap();
        assert_eq!(t.type_str(), "vector<vector<int>>");
        assert_eq!(reg.get(&spec("Point", vec![])).unwrap().type_str(), "Point");
        assert!(reg.get(&spec("Nope", vec![])).is_none());
        assert!(reg.get(&spec("void", vec![])).is_none());
    }

    #[test]
    fn vector_methods() {
        let tr = Translator::default();
        let mut v = Type::Vector(Rc::new(Type::int())).create();
        Method::PushBack
            .apply(&mut v, vec![Value::Int(4)], &tr)
            .unwrap();
        Method::PushBack
            .apply(&mut v, vec![Value::Int(5)], &tr)
            .unwrap();
        assert_eq!(
            Method::Size.apply(&mut v, vec![], &tr).unwrap(),
            Some(Value::Int(2))
        );
        assert_eq!(
            Method::Back.apply(&mut v, vec![], &tr).unwrap(),
            Some(Value::Int(5))
        );
        Method::Resize
            .apply(&mut v, vec![Value::Int(4)], &tr)
            .unwrap();
        assert_eq!(
            Method::Back.apply(&mut v, vec![], &tr).unwrap(),
            Some(Value::Int(0))
        );
        Method::Clear.apply(&mut v, vec![], &tr).unwrap();
        let err = Method::PopBack.apply(&mut v, vec![], &tr).unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexOutOfRange);
    }

    #[test]
    fn string_methods_and_signatures() {
        let tr = Translator::default();
        let ty = Type::Basic(BasicType::String);
        assert_eq!(ty.method("length"), Some(Method::Length));
        assert_eq!(ty.method("push_back"), None);
        let mut s = Value::String("hola".to_string());
        assert_eq!(
            Method::Length.apply(&mut s, vec![], &tr).unwrap(),
            Some(Value::Int(4))
        );
        let vt = Type::Vector(Rc::new(Type::Basic(BasicType::Char)));
        assert_eq!(Method::PushBack.signature(&vt).type_str(), "void(char)");
        assert_eq!(Method::Front.signature(&vt).type_str(), "char()");
    }
}
