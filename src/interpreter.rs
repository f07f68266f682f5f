use std::fmt::Display;
use std::io::Write;
use std::ops::{Add, Div, Mul, Sub};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::*;
use crate::env::{Binding, Environment};
use crate::error::{ErrorKind, EvalError, EvalResult};
use crate::io::Input;
use crate::translate::Translator;
use crate::types::{conversion_error, BasicType, FunctionType, ParamType, StructType, Type, TypeRegistry};
use crate::value::{Callable, FuncPtr, Place, Receiver, Stream, Value};

/// What a statement asks of its enclosing construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Next,
    Return,
}

/// Tree-walking evaluator. One instance runs one program.
pub struct Interpreter {
    env: Environment,
    types: TypeRegistry,
    tr: Translator,
    input: Input,
    out: Box<dyn Write>,
    // value deposited by `return`, taken by the caller
    ret: Option<Value>,
}

impl Interpreter {
    pub fn new(input: Input, out: Box<dyn Write>, tr: Translator) -> Self {
        let mut it = Self {
            env: Environment::with_translator(tr),
            types: TypeRegistry::new(),
            tr,
            input,
            out,
            ret: None,
        };
        it.install_builtins();
        it
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub(crate) fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    pub fn translator(&self) -> Translator {
        self.tr
    }

    fn install_builtins(&mut self) {
        self.env.set("cout", Value::Stream(Stream::Cout), true);
        self.env.set("cin", Value::Stream(Stream::Cin), true);
        self.env.set("endl", Value::Stream(Stream::Endl), true);
        let int = ParamType {
            ty: Type::int(),
            by_ref: false,
        };
        let max = Callable {
            name: "max".to_string(),
            ty: Rc::new(FunctionType {
                ret: Some(Type::int()),
                params: vec![int.clone(), int],
            }),
            ptr: FuncPtr::Native(native_max),
        };
        self.env.set("max", Value::Function(Rc::new(max)), true);
    }

    fn err(&self, kind: ErrorKind, key: &str, args: &[&dyn Display]) -> EvalError {
        EvalError::new(kind, self.tr.tr(key, args))
    }

    /// Run a whole program: declarations, globals, then `main`.
    pub fn run(&mut self, program: &Program) -> EvalResult<()> {
        let main = self.prepare(program)?;
        debug!("calling main");
        let result = self
            .check_args(&main, Vec::new())
            .and_then(|args| self.invoke(&main, args));
        let flushed = self.out.flush();
        result?;
        flushed.map_err(|_| self.err(ErrorKind::Io, "Error when writing output", &[]))
    }

    /// Register structs and functions, evaluate globals and return `main`.
    pub fn prepare(&mut self, program: &Program) -> EvalResult<Rc<Callable>> {
        for item in &program.items {
            match item {
                Item::Struct(s) => self
                    .declare_struct(s)
                    .map_err(|e| e.at(s.span.ini))?,
                Item::Func(f) => self.declare_func(f).map_err(|e| e.at(f.span.ini))?,
                _ => {}
            }
        }
        for item in &program.items {
            if let Item::Decl(stmt) = item {
                self.exec_stmt(stmt)?;
            }
        }
        match self.env.get("main") {
            Some(Value::Function(c)) => Ok(c.clone()),
            Some(_) => Err(self.err(ErrorKind::NoMain, "'main' is not a function.", &[])),
            None => Err(self.err(
                ErrorKind::NoMain,
                "The 'main' function does not exist.",
                &[],
            )),
        }
    }

    fn declare_struct(&mut self, s: &StructDecl) -> EvalResult<()> {
        let mut fields = Vec::new();
        for decl in &s.fields {
            let ty = self.resolve(&decl.ty)?;
            for item in &decl.items {
                let fty = match &item.kind {
                    Declarator::Array(size) => {
                        Type::Array(Rc::new(ty.clone()), self.array_size(size)?)
                    }
                    _ => ty.clone(),
                };
                fields.push((item.name.clone(), fty));
            }
        }
        debug!(name = %s.name, fields = fields.len(), "struct registered");
        self.types.register(StructType {
            name: s.name.clone(),
            fields,
        });
        Ok(())
    }

    fn declare_func(&mut self, f: &Rc<FuncDecl>) -> EvalResult<()> {
        let ret = if f.return_type.is_void() {
            None
        } else {
            Some(self.resolve(&f.return_type)?)
        };
        let mut params = Vec::with_capacity(f.params.len());
        for p in &f.params {
            params.push(ParamType {
                ty: self.resolve(&p.ty).map_err(|e| e.at(p.span.ini))?,
                by_ref: p.ty.reference,
            });
        }
        let callable = Callable {
            name: f.name.clone(),
            ty: Rc::new(FunctionType { ret, params }),
            ptr: FuncPtr::User(f.clone()),
        };
        self.env
            .set(&f.name, Value::Function(Rc::new(callable)), false);
        Ok(())
    }

    fn resolve(&self, spec: &TypeSpec) -> EvalResult<Type> {
        self.types.get(spec).ok_or_else(|| {
            self.err(
                ErrorKind::TypeUnknown,
                "The type '%s' does not exist.",
                &[&spec.type_str()],
            )
        })
    }

    // ---- statements ----

    pub fn exec_stmt(&mut self, s: &Stmt) -> EvalResult<Flow> {
        trace!(span = %s.span, "exec");
        self.exec_node(s).map_err(|e| e.at(s.span.ini))
    }

    fn exec_node(&mut self, s: &Stmt) -> EvalResult<Flow> {
        match &s.kind {
            StmtKind::Block(b) => {
                self.env.push("<block>");
                let flow = self.exec_body(b);
                self.env.pop();
                flow
            }
            StmtKind::Expr(e) => {
                self.eval_expr(e)?;
                Ok(Flow::Next)
            }
            StmtKind::Return(e) => {
                self.ret = match e {
                    Some(e) => Some(self.eval_rvalue(e)?),
                    None => None,
                };
                Ok(Flow::Return)
            }
            StmtKind::Decl(d) => {
                self.exec_decl(d, &[])?;
                Ok(Flow::Next)
            }
            StmtKind::If { cond, then, els } => {
                if self.condition(cond, "if")? {
                    self.exec_stmt(then)
                } else if let Some(els) = els {
                    self.exec_stmt(els)
                } else {
                    Ok(Flow::Next)
                }
            }
            StmtKind::While { cond, body } => {
                self.env.push("while");
                let flow = self.run_while(cond, body);
                self.env.pop();
                flow
            }
            StmtKind::For {
                init,
                cond,
                post,
                body,
            } => {
                self.env.push("for");
                let flow = self.run_for(init.as_deref(), cond, post.as_ref(), body);
                self.env.pop();
                flow
            }
            StmtKind::Empty => Ok(Flow::Next),
        }
    }

    /// Statements of a function body or block, in the current scope.
    pub fn exec_body(&mut self, block: &Block) -> EvalResult<Flow> {
        for s in &block.stmts {
            if self.exec_stmt(s)? == Flow::Return {
                return Ok(Flow::Return);
            }
        }
        Ok(Flow::Next)
    }

    fn run_while(&mut self, cond: &Expr, body: &Stmt) -> EvalResult<Flow> {
        while self.condition(cond, "while")? {
            if self.exec_stmt(body)? == Flow::Return {
                return Ok(Flow::Return);
            }
        }
        Ok(Flow::Next)
    }

    fn run_for(
        &mut self,
        init: Option<&Stmt>,
        cond: &Expr,
        post: Option<&Expr>,
        body: &Stmt,
    ) -> EvalResult<Flow> {
        if let Some(init) = init {
            self.exec_stmt(init)?;
        }
        while self.condition(cond, "for")? {
            if self.exec_stmt(body)? == Flow::Return {
                return Ok(Flow::Return);
            }
            if let Some(post) = post {
                self.eval_expr(post)?;
            }
        }
        Ok(Flow::Next)
    }

    /// Evaluate a loop or `if` condition, which must be a `bool`.
    pub fn condition(&mut self, cond: &Expr, construct: &str) -> EvalResult<bool> {
        match self.eval_rvalue(cond)? {
            Value::Bool(b) => Ok(b),
            _ => Err(self
                .err(
                    ErrorKind::ConditionType,
                    "The condition in a '%s' must be a value of type 'bool'.",
                    &[&construct],
                )
                .at(cond.span.ini)),
        }
    }

    /// Declare every item of `d`. `pre[i]`, when present, is the already
    /// computed initializer of item `i`.
    pub fn exec_decl(&mut self, d: &DeclStmt, pre: &[Option<Value>]) -> EvalResult<()> {
        for i in 0..d.items.len() {
            self.declare_item_at(d, i, pre.get(i).cloned().flatten())?;
        }
        Ok(())
    }

    /// Declare item `i` of `d` alone.
    pub fn declare_item_at(&mut self, d: &DeclStmt, i: usize, pre: Option<Value>) -> EvalResult<()> {
        let Some(item) = d.items.get(i) else {
            return Ok(());
        };
        let ty = self.resolve(&d.ty).map_err(|e| e.at(d.ty.span.ini))?;
        self.declare_item(&d.ty, &ty, item, pre)
            .map_err(|e| e.at(item.span.ini))
    }

    fn declare_item(
        &mut self,
        spec: &TypeSpec,
        ty: &Type,
        item: &DeclItem,
        pre: Option<Value>,
    ) -> EvalResult<()> {
        let value = if spec.reference {
            let target = match (pre, &item.init) {
                (Some(v), _) => v,
                (None, Some(e)) => self.eval_expr(e)?,
                (None, None) => Value::Null,
            };
            let actual = match &target {
                Value::Reference(place) => self.env.read(place)?.type_str(),
                _ => {
                    return Err(self.err(
                        ErrorKind::ReferenceRequired,
                        "A reference must be initialized with a variable.",
                        &[],
                    ))
                }
            };
            if actual != ty.type_str() {
                return Err(conversion_error(&self.tr, &ty.type_str(), &actual));
            }
            target
        } else {
            let ty = match &item.kind {
                Declarator::Array(size) => Type::Array(Rc::new(ty.clone()), self.array_size(size)?),
                _ => ty.clone(),
            };
            match (&item.kind, pre, &item.init) {
                (Declarator::Object(args), _, _) => {
                    let mut values = Vec::with_capacity(args.len());
                    for a in args {
                        values.push(self.eval_rvalue(a)?);
                    }
                    ty.construct(values, &self.tr)?
                }
                (_, Some(v), _) => {
                    let v = self.deref(v)?;
                    self.convert_to(&ty, v)?
                }
                (_, None, Some(init)) => self.eval_init(&ty, init)?,
                (_, None, None) => ty.create(),
            }
        };
        self.env.declare(
            &item.name,
            Binding {
                value,
                hidden: false,
                is_const: spec.is_const,
            },
        );
        Ok(())
    }

    // Initializer, including nested brace lists.
    fn eval_init(&mut self, ty: &Type, e: &Expr) -> EvalResult<Value> {
        let ExprKind::List(elems) = &e.kind else {
            let v = self.eval_rvalue(e)?;
            return self.convert_to(ty, v).map_err(|err| err.at(e.span.ini));
        };
        let too_many = |tr: &Translator| {
            EvalError::new(
                ErrorKind::ConversionFailure,
                tr.tr("Too many initializers for '%s'.", &[&ty.type_str()]),
            )
            .at(e.span.ini)
        };
        let mut value = ty.create();
        match &mut value {
            Value::Array { elem, items } => {
                if elems.len() > items.len() {
                    return Err(too_many(&self.tr));
                }
                for (slot, e) in items.iter_mut().zip(elems) {
                    *slot = self.eval_init(elem, e)?;
                }
            }
            Value::Vector { elem, items } => {
                for e in elems {
                    items.push(self.eval_init(elem, e)?);
                }
            }
            Value::Struct { def, fields } => {
                if elems.len() > fields.len() {
                    return Err(too_many(&self.tr));
                }
                for ((_, fty), (slot, e)) in def.fields.iter().zip(fields.iter_mut().zip(elems)) {
                    *slot = self.eval_init(fty, e)?;
                }
            }
            _ => {
                return match elems.as_slice() {
                    [single] => self.eval_init(ty, single),
                    _ => Err(too_many(&self.tr)),
                }
            }
        }
        Ok(value)
    }

    fn array_size(&mut self, size: &Expr) -> EvalResult<usize> {
        match self.eval_rvalue(size)? {
            Value::Int(n) if n > 0 => Ok(n as usize),
            Value::Int(_) => Err(self.err(
                ErrorKind::ArraySize,
                "The size of an array must be a positive integer.",
                &[],
            )),
            _ => Err(self.err(
                ErrorKind::ArraySize,
                "The size of an array must be an integer.",
                &[],
            )),
        }
        .map_err(|e| e.at(size.span.ini))
    }

    fn convert_to(&self, ty: &Type, v: Value) -> EvalResult<Value> {
        ty.convert(&v)
            .ok_or_else(|| conversion_error(&self.tr, &ty.type_str(), &v.type_str()))
    }

    // ---- expressions ----

    pub fn eval_expr(&mut self, e: &Expr) -> EvalResult<Value> {
        self.eval_node(e).map_err(|err| err.at(e.span.ini))
    }

    /// Evaluate and dereference.
    pub fn eval_rvalue(&mut self, e: &Expr) -> EvalResult<Value> {
        let v = self.eval_expr(e)?;
        self.deref(v).map_err(|err| err.at(e.span.ini))
    }

    pub fn deref(&self, v: Value) -> EvalResult<Value> {
        match v {
            Value::Reference(p) => self.env.read(&p).cloned(),
            v => Ok(v),
        }
    }

    fn eval_node(&mut self, e: &Expr) -> EvalResult<Value> {
        match &e.kind {
            ExprKind::Literal(l) => Ok(literal(l)),
            ExprKind::Ident(name) => self.eval_ident(name),
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right),
            ExprKind::Call { func, args } => {
                let Value::Function(callee) = self.eval_rvalue(func)? else {
                    return Err(self.err(
                        ErrorKind::NotCallable,
                        "Calling something other than a function.",
                        &[],
                    ));
                };
                let mut values = Vec::with_capacity(args.len());
                for a in args {
                    values.push(self.eval_expr(a)?);
                }
                self.call(&callee, values)
            }
            ExprKind::Index { base, index } => self.eval_index(base, index),
            ExprKind::Field { base, field } => self.eval_field(base, field),
            ExprKind::Cond { cond, then, els } => match self.eval_rvalue(cond)? {
                Value::Bool(true) => self.eval_expr(then),
                Value::Bool(false) => self.eval_expr(els),
                _ => Err(self
                    .err(
                        ErrorKind::ConditionType,
                        "A conditional expression must have a condition of type 'bool'.",
                        &[],
                    )
                    .at(cond.span.ini)),
            },
            ExprKind::List(_) => Err(self.err(
                ErrorKind::Unsupported,
                "Brace lists can only initialize a declaration.",
                &[],
            )),
            ExprKind::Sign { negative, expr } => match (self.eval_rvalue(expr)?, *negative) {
                (v @ (Value::Int(_) | Value::Float(_) | Value::Double(_)), false) => Ok(v),
                (Value::Int(i), true) => Ok(Value::Int(i.wrapping_neg())),
                (Value::Float(f), true) => Ok(Value::Float(-f)),
                (Value::Double(d), true) => Ok(Value::Double(-d)),
                (v, _) => Err(self.err(
                    ErrorKind::IncompatibleOperands,
                    "The sign change for '%s' makes no sense.",
                    &[&v.type_str()],
                )),
            },
            ExprKind::Not(inner) => match self.eval_rvalue(inner)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                _ => Err(self.err(
                    ErrorKind::IncompatibleOperands,
                    "To negate an expression it must be of type 'bool'.",
                    &[],
                )),
            },
            ExprKind::Incr {
                decrement,
                prefix,
                expr,
            } => self.eval_incr(*decrement, *prefix, expr),
        }
    }

    fn eval_ident(&self, name: &str) -> EvalResult<Value> {
        let slot = self.env.lookup(name).ok_or_else(|| {
            self.err(ErrorKind::Name, "The variable '%s' does not exist.", &[&name])
        })?;
        // reference bindings alias their target directly
        match &self.env.binding(&slot)?.value {
            Value::Reference(p) => Ok(Value::Reference(p.clone())),
            _ => Ok(Value::Reference(Place::root(slot))),
        }
    }

    fn eval_binary(&mut self, op: BinOp, left: &Expr, right: &Expr) -> EvalResult<Value> {
        let l = self.eval_expr(left)?;
        if op.is_assignment() {
            let r = self.eval_rvalue(right)?;
            return self.assign(op, l, r);
        }
        let lv = self.deref(l.clone())?;
        match (&lv, op) {
            (Value::Stream(Stream::Cout), BinOp::Shl) => {
                let r = self.eval_rvalue(right)?;
                self.write_value(&r)?;
                return Ok(l);
            }
            (Value::Stream(Stream::Cin), BinOp::Shr) => {
                self.read_into(right)
                    .map_err(|e| e.at(right.span.ini))?;
                return Ok(l);
            }
            _ => {}
        }
        // no short-circuit: both operands are always evaluated
        let rv = self.eval_rvalue(right)?;
        self.binary(op, lv, rv)
    }

    pub(crate) fn write_value(&mut self, v: &Value) -> EvalResult<()> {
        write!(self.out, "{}", v)
            .map_err(|_| self.err(ErrorKind::Io, "Error when writing output", &[]))
    }

    fn read_into(&mut self, target: &Expr) -> EvalResult<()> {
        let Some(name) = target.ident() else {
            return Err(self.err(
                ErrorKind::NotAnLvalue,
                "Reading with 'cin' requires variables.",
                &[],
            ));
        };
        if self.env.lookup(name).is_none() {
            return Err(self.err(
                ErrorKind::Name,
                "The variable '%s' is not declared.",
                &[&name],
            ));
        }
        let Value::Reference(place) = self.eval_expr(target)? else {
            return Ok(());
        };
        self.check_mutable(&place)?;
        let current = self.env.read(&place)?.clone();
        match self.input.read_like(&current) {
            Ok(Some(v)) => self.env.write(&place, v),
            Ok(None) => Ok(()),
            Err(_) => Err(self.err(ErrorKind::Io, "Error when reading input", &[])),
        }
    }

    fn check_mutable(&self, place: &Place) -> EvalResult<()> {
        if self.env.is_const(place)? {
            let name = self.env.slot_name(&place.slot).unwrap_or_default();
            return Err(self.err(
                ErrorKind::NotAnLvalue,
                "The constant '%s' cannot be modified.",
                &[&name],
            ));
        }
        Ok(())
    }

    pub fn assign(&mut self, op: BinOp, l: Value, r: Value) -> EvalResult<Value> {
        let Value::Reference(place) = l else {
            return Err(if op == BinOp::Assign {
                self.err(
                    ErrorKind::NotAnLvalue,
                    "You are trying to assign to something that is not a variable.",
                    &[],
                )
            } else {
                self.err(
                    ErrorKind::NotAnLvalue,
                    "To use '%s' you must put a variable on the left.",
                    &[&op.symbol()],
                )
            });
        };
        self.check_mutable(&place)?;
        let current = self.env.read(&place)?.clone();
        let ty = current
            .type_of()
            .ok_or_else(|| conversion_error(&self.tr, &current.type_str(), &r.type_str()))?;
        let r = self.convert_to(&ty, r)?;
        let new = match op.compound_base() {
            None => r,
            Some(base) => {
                let v = self.binary(base, current, r)?;
                self.convert_to(&ty, v)?
            }
        };
        self.env.write(&place, new.clone())?;
        Ok(new)
    }

    /// Binary operator over two dereferenced operands.
    pub fn binary(&self, op: BinOp, l: Value, r: Value) -> EvalResult<Value> {
        let incompatible = || {
            self.err(
                ErrorKind::IncompatibleOperands,
                "The operands of '%s' are incompatible.",
                &[&op.symbol()],
            )
        };
        match op {
            BinOp::And | BinOp::Or => match (l, r) {
                (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BinOp::And {
                    a && b
                } else {
                    a || b
                })),
                _ => Err(self.err(
                    ErrorKind::IncompatibleOperands,
                    "The operands of '%s' are not of type 'bool'.",
                    &[&op.symbol()],
                )),
            },
            BinOp::Eq | BinOp::Ne => {
                if l.type_str() != r.type_str() {
                    return Err(self.err(
                        ErrorKind::IncompatibleOperands,
                        "The operands of '%s' are not of the same type.",
                        &[&op.symbol()],
                    ));
                }
                let eq = l == r;
                Ok(Value::Bool(if op == BinOp::Eq { eq } else { !eq }))
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ord = match (&l, &r) {
                    (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
                    (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
                    (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
                    (Value::String(a), Value::String(b)) => a.partial_cmp(b),
                    _ => return Err(incompatible()),
                };
                let Some(ord) = ord else {
                    return Ok(Value::Bool(false));
                };
                Ok(Value::Bool(match op {
                    BinOp::Lt => ord.is_lt(),
                    BinOp::Le => ord.is_le(),
                    BinOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                }))
            }
            BinOp::Add if matches!((&l, &r), (Value::String(_), Value::String(_))) => {
                match (l, r) {
                    (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                    _ => Err(incompatible()),
                }
            }
            _ => {
                // arithmetic and bitwise: the right operand takes the left's type
                let basic = match &l {
                    Value::Int(_) => BasicType::Int,
                    Value::Float(_) => BasicType::Float,
                    Value::Double(_) => BasicType::Double,
                    _ => return Err(incompatible()),
                };
                let r = Type::Basic(basic).convert(&r).ok_or_else(incompatible)?;
                match (l, r) {
                    (Value::Int(a), Value::Int(b)) => self.int_op(op, a, b).map(Value::Int),
                    (Value::Float(a), Value::Float(b)) => {
                        float_op(op, a, b).map(Value::Float).ok_or_else(incompatible)
                    }
                    (Value::Double(a), Value::Double(b)) => {
                        float_op(op, a, b).map(Value::Double).ok_or_else(incompatible)
                    }
                    _ => Err(incompatible()),
                }
            }
        }
    }

    fn int_op(&self, op: BinOp, a: i32, b: i32) -> EvalResult<i32> {
        let div_zero = || self.err(ErrorKind::ArithmeticFault, "Division by zero.", &[]);
        Ok(match op {
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div if b == 0 => return Err(div_zero()),
            BinOp::Div => a.wrapping_div(b),
            BinOp::Mod if b == 0 => return Err(div_zero()),
            BinOp::Mod => a.wrapping_rem(b),
            BinOp::BitAnd => a & b,
            BinOp::BitOr => a | b,
            BinOp::BitXor => a ^ b,
            BinOp::Shl => a.wrapping_shl(b as u32),
            BinOp::Shr => a.wrapping_shr(b as u32),
            _ => {
                return Err(self.err(
                    ErrorKind::IncompatibleOperands,
                    "The operands of '%s' are incompatible.",
                    &[&op.symbol()],
                ))
            }
        })
    }

    fn eval_incr(&mut self, decrement: bool, prefix: bool, expr: &Expr) -> EvalResult<Value> {
        let Value::Reference(place) = self.eval_expr(expr)? else {
            return Err(self.err(
                ErrorKind::NotAnLvalue,
                "You must increment a variable, not a value.",
                &[],
            ));
        };
        self.check_mutable(&place)?;
        let old = match self.env.read(&place)? {
            Value::Int(i) => *i,
            other => {
                return Err(self.err(
                    ErrorKind::IncompatibleOperands,
                    "You are incrementing a value of type '%s'.",
                    &[&other.type_str()],
                ))
            }
        };
        let new = if decrement {
            old.wrapping_sub(1)
        } else {
            old.wrapping_add(1)
        };
        self.env.write(&place, Value::Int(new))?;
        Ok(Value::Int(if prefix { new } else { old }))
    }

    fn eval_index(&mut self, base: &Expr, index: &Expr) -> EvalResult<Value> {
        let b = self.eval_expr(base)?;
        let Value::Int(i) = self.eval_rvalue(index)? else {
            return Err(self
                .err(
                    ErrorKind::IndexOutOfRange,
                    "The index in an array access must be an integer.",
                    &[],
                )
                .at(index.span.ini));
        };
        let len = match &b {
            Value::Reference(p) => self.container_len(self.env.read(p)?)?,
            v => self.container_len(v)?,
        };
        if i < 0 || i as usize >= len {
            return Err(self
                .err(ErrorKind::IndexOutOfRange, "Cell %d does not exist.", &[&i])
                .at(index.span.ini));
        }
        let i = i as usize;
        match b {
            Value::Reference(p) => Ok(Value::Reference(p.index(i))),
            Value::Array { mut items, .. } | Value::Vector { mut items, .. } => {
                Ok(items.swap_remove(i))
            }
            other => self.container_len(&other).map(|_| Value::Null),
        }
    }

    fn container_len(&self, v: &Value) -> EvalResult<usize> {
        match v {
            Value::Array { items, .. } | Value::Vector { items, .. } => Ok(items.len()),
            _ => Err(self.err(
                ErrorKind::IndexOutOfRange,
                "Index expressions must be used on arrays or vectors.",
                &[],
            )),
        }
    }

    fn eval_field(&mut self, base: &Expr, field: &str) -> EvalResult<Value> {
        let b = self.eval_expr(base)?;
        let bv = self.deref(b.clone())?;
        if let Value::Struct { def, fields } = &bv {
            if let Some(i) = def.field_index(field) {
                return Ok(match b {
                    Value::Reference(p) => Value::Reference(p.field(i)),
                    _ => fields[i].clone(),
                });
            }
        }
        let found = bv
            .type_of()
            .and_then(|t| t.method(field).map(|m| (t, m)));
        let Some((ty, method)) = found else {
            return Err(self.err(
                ErrorKind::NoSuchField,
                "This object has no field '%s'.",
                &[&field],
            ));
        };
        let receiver = match b {
            Value::Reference(p) => Receiver::Place(p),
            v => Receiver::Temp(v),
        };
        Ok(Value::Function(Rc::new(Callable {
            name: method.name().to_string(),
            ty: Rc::new(method.signature(&ty)),
            ptr: FuncPtr::Bound { method, receiver },
        })))
    }

    // ---- calls ----

    /// Full call protocol: argument checks, invocation, return handling.
    pub fn call(&mut self, callee: &Rc<Callable>, args: Vec<Value>) -> EvalResult<Value> {
        let args = self.check_args(callee, args)?;
        self.ret = None;
        self.invoke(callee, args)?;
        let ret = self.ret.take();
        self.finish_call(callee, ret)
    }

    /// Arity, by-reference and exact-type checks. By-value arguments come back dereferenced.
    pub fn check_args(&self, callee: &Callable, args: Vec<Value>) -> EvalResult<Vec<Value>> {
        let params = &callee.ty.params;
        if params.len() != args.len() {
            return Err(self.err(
                ErrorKind::Arity,
                "Wrong number of arguments when calling '%s'.",
                &[&callee.name],
            ));
        }
        let mut out = Vec::with_capacity(args.len());
        for (i, (param, arg)) in params.iter().zip(args).enumerate() {
            let (value, actual) = if param.by_ref {
                let actual = match &arg {
                    Value::Reference(place) => self.env.read(place)?.type_str(),
                    _ => {
                        return Err(self.err(
                            ErrorKind::ReferenceRequired,
                            "Parameter %d requires a variable.",
                            &[&(i + 1)],
                        ))
                    }
                };
                (arg, actual)
            } else {
                let v = self.deref(arg)?;
                let actual = v.type_str();
                (v, actual)
            };
            let expected = param.ty.type_str();
            if actual != expected {
                return Err(self.err(
                    ErrorKind::ArgumentTypeMismatch,
                    "Argument %d is not compatible with the parameter type ('%s' expected, '%s' found).",
                    &[&(i + 1), &expected, &actual],
                ));
            }
            out.push(value);
        }
        Ok(out)
    }

    fn invoke(&mut self, callee: &Callable, args: Vec<Value>) -> EvalResult<()> {
        match &callee.ptr {
            FuncPtr::User(decl) => {
                self.enter_function(decl, args);
                let flow = self.exec_body(&decl.body);
                self.env.pop();
                flow.map(|_| ())
            }
            FuncPtr::Native(f) => {
                self.ret = f(&args);
                Ok(())
            }
            FuncPtr::Bound { method, receiver } => {
                let tr = self.tr;
                self.ret = match receiver {
                    Receiver::Place(p) => method.apply(self.env.get_mut(p)?, args, &tr)?,
                    Receiver::Temp(v) => method.apply(&mut v.clone(), args, &tr)?,
                };
                Ok(())
            }
        }
    }

    /// Push the function's scope and bind its (checked) arguments.
    pub fn enter_function(&mut self, decl: &FuncDecl, args: Vec<Value>) {
        debug!(function = %decl.name, args = args.len(), "enter function");
        self.env.push(&decl.name);
        for (p, a) in decl.params.iter().zip(args) {
            self.env.declare(
                &p.name,
                Binding {
                    value: a,
                    hidden: false,
                    is_const: p.ty.is_const,
                },
            );
        }
    }

    /// Missing-return check and conversion to the declared return type.
    pub fn finish_call(&self, callee: &Callable, ret: Option<Value>) -> EvalResult<Value> {
        match (&callee.ty.ret, ret) {
            (None, _) => Ok(Value::Null),
            (Some(ty), None) => Err(self.err(
                ErrorKind::MissingReturn,
                "The function '%s' should return a '%s'.",
                &[&callee.name, &ty.type_str()],
            )),
            (Some(ty), Some(v)) => self.convert_to(ty, v),
        }
    }

    /// The user function called by `e`, if `e` is a direct call to one.
    pub fn user_callee(&self, e: &Expr) -> Option<Rc<Callable>> {
        let ExprKind::Call { func, .. } = &e.kind else {
            return None;
        };
        match self.env.get(func.ident()?)? {
            Value::Function(c) if matches!(c.ptr, FuncPtr::User(_)) => Some(c.clone()),
            _ => None,
        }
    }
}

fn literal(l: &Literal) -> Value {
    match l {
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Double(d) => Value::Double(*d),
        Literal::Char(c) => Value::Char(*c),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn float_op<T>(op: BinOp, a: T, b: T) -> Option<T>
where
    T: Add<Output = T> + Sub<Output = T> + Mul<Output = T> + Div<Output = T>,
{
    Some(match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        _ => return None,
    })
}

fn native_max(args: &[Value]) -> Option<Value> {
    match args {
        [Value::Int(a), Value::Int(b)] => Some(Value::Int(*a.max(b))),
        _ => None,
    }
}
