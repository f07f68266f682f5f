//! Single-step driver over the evaluator.
//!
//! The stepper keeps an explicit stack of resumable states, one per construct
//! being worked through. Each state has two entry points:
//!
//! * `settle` does structural, invisible work (entering scopes, descending
//!   into the next statement, finishing a call) and either reports that the
//!   state is ready for a visible step or transfers control.
//! * `act` performs exactly one visible step and yields its status text.
//!
//! [`Stepper::step`] runs one `act` on the top state and then settles the
//! stack, so [`Stepper::span`] always names what the next step will do.

use std::mem;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::ast::{
    BinOp, Block, DeclStmt, Declarator, Expr, ExprKind, FuncDecl, Program, Span, Stmt, StmtKind,
};
use crate::env::Environment;
use crate::error::{ErrorKind, EvalError, EvalResult};
use crate::interpreter::Interpreter;
use crate::io::{Input, SharedBuffer};
use crate::translate::Translator;
use crate::value::{Callable, FuncPtr, Stream, Value};

enum Transition<'p> {
    /// From `settle`: ready for a visible step. From `act`: more to do here.
    Stay,
    Push(State<'p>),
    Pop(Option<Value>),
    /// Discard states up to the enclosing call or program frame.
    Unwind(Option<Value>),
}

type Acted<'p> = EvalResult<(String, Transition<'p>)>;

enum State<'p> {
    Program(ProgramState<'p>),
    Block(BlockState<'p>),
    If(IfState<'p>),
    While(WhileState<'p>),
    For(ForState<'p>),
    Call(CallState<'p>),
    Assign(AssignState<'p>),
    Write(WriteState<'p>),
    Decl(DeclState<'p>),
    Return(ReturnState<'p>),
    Eval(EvalState<'p>),
}

impl<'p> State<'p> {
    fn name(&self) -> &'static str {
        match self {
            State::Program(_) => "program",
            State::Block(_) => "block",
            State::If(_) => "if",
            State::While(_) => "while",
            State::For(_) => "for",
            State::Call(_) => "call",
            State::Assign(_) => "assign",
            State::Write(_) => "write",
            State::Decl(_) => "decl",
            State::Return(_) => "return",
            State::Eval(_) => "eval",
        }
    }

    fn span(&self) -> Span {
        match self {
            State::Program(s) => s.span(),
            State::Block(s) => s.block.span,
            State::If(s) => s.cond.span,
            State::While(s) => s.cond.span,
            State::For(s) => s.span(),
            State::Call(s) => s.span(),
            State::Assign(s) => s.span,
            State::Write(s) => s.span(),
            State::Decl(s) => s.decl.span,
            State::Return(s) => s.span,
            State::Eval(s) => s.span,
        }
    }

    fn is_frame(&self) -> bool {
        matches!(self, State::Program(_) | State::Call(_))
    }

    /// Bookkeeping between steps. Never fails: anything that can go wrong
    /// is left for `act`, so the error belongs to the step that shows it.
    fn settle(&mut self, interp: &mut Interpreter, program: &'p Program) -> Transition<'p> {
        match self {
            State::Program(s) => s.settle(),
            State::Block(s) => s.settle(interp, program),
            State::If(s) => {
                if s.decided {
                    Transition::Pop(None)
                } else {
                    Transition::Stay
                }
            }
            State::While(s) => {
                if !s.entered {
                    interp.env_mut().push("while");
                    s.entered = true;
                }
                Transition::Stay
            }
            State::For(s) => s.settle(interp, program),
            State::Call(s) => s.settle(interp),
            State::Assign(s) => s.settle(interp, program),
            State::Write(s) => s.settle(),
            State::Decl(s) => s.settle(interp, program),
            State::Return(s) => s.settle(interp, program),
            State::Eval(s) => {
                if s.expr.is_some() {
                    Transition::Stay
                } else {
                    Transition::Pop(None)
                }
            }
        }
    }

    fn act(&mut self, interp: &mut Interpreter, program: &'p Program) -> Acted<'p> {
        match self {
            State::Program(s) => s.act(interp),
            State::Block(_) => Ok((String::new(), Transition::Pop(None))),
            State::If(s) => s.act(interp, program),
            State::While(s) => s.act(interp, program),
            State::For(s) => s.act(interp, program),
            State::Call(s) => s.act(interp),
            State::Assign(s) => s.act(interp),
            State::Write(s) => s.act(interp),
            State::Decl(s) => s.act(interp, program),
            State::Return(s) => s.act(interp),
            State::Eval(s) => s.act(interp),
        }
    }

    /// Value handed back by a finished call or an unwinding `return`.
    fn receive(&mut self, value: Value) {
        match self {
            State::Call(s) => s.ret = Some(value),
            State::Assign(s) => s.pending = Some(value),
            State::Decl(s) => s.pending = Some(value),
            State::Return(s) => s.value = Some(value),
            _ => {}
        }
    }

    /// Release scopes owned by a state discarded during unwinding.
    fn leave(&mut self, interp: &mut Interpreter) {
        let owned = match self {
            State::Block(s) => mem::take(&mut s.entered),
            State::While(s) => mem::take(&mut s.entered),
            State::For(s) => mem::take(&mut s.entered),
            _ => false,
        };
        if owned {
            interp.env_mut().pop();
        }
    }
}

fn state_for<'p>(stmt: &'p Stmt, interp: &Interpreter, program: &'p Program) -> State<'p> {
    match &stmt.kind {
        StmtKind::Block(b) => State::Block(BlockState::new(b, true)),
        StmtKind::If { cond, then, els } => State::If(IfState {
            cond,
            then,
            els: els.as_deref(),
            decided: false,
        }),
        StmtKind::While { cond, body } => State::While(WhileState {
            cond,
            body,
            entered: false,
        }),
        StmtKind::For {
            init,
            cond,
            post,
            body,
        } => State::For(ForState {
            init: init.as_deref(),
            cond,
            post: post.as_ref(),
            body,
            phase: ForPhase::Init,
            entered: false,
        }),
        StmtKind::Return(expr) => State::Return(ReturnState {
            expr: expr.as_ref(),
            span: stmt.span,
            value: None,
            awaiting: false,
        }),
        StmtKind::Decl(decl) => State::Decl(DeclState {
            decl,
            next: 0,
            pending: None,
            awaiting: false,
        }),
        StmtKind::Expr(e) => expr_state(e, stmt.span, interp, program),
        StmtKind::Empty => State::Eval(EvalState {
            expr: None,
            span: stmt.span,
        }),
    }
}

fn expr_state<'p>(e: &'p Expr, span: Span, interp: &Interpreter, program: &'p Program) -> State<'p> {
    match &e.kind {
        ExprKind::Binary {
            op: BinOp::Assign,
            left,
            right,
        } => {
            return State::Assign(AssignState {
                left,
                right,
                span,
                target: None,
                pending: None,
                awaiting: false,
            })
        }
        ExprKind::Binary { op: BinOp::Shl, .. }
            if is_stream(interp, e.chain_head(BinOp::Shl), Stream::Cout) =>
        {
            return State::Write(WriteState {
                head: e.chain_head(BinOp::Shl),
                operands: e.collect_rights(BinOp::Shl),
                next: 0,
                started: false,
            })
        }
        _ => {}
    }
    match call_state(e, interp, program) {
        Some(call) => State::Call(call),
        None => State::Eval(EvalState {
            expr: Some(e),
            span,
        }),
    }
}

fn is_stream(interp: &Interpreter, head: &Expr, which: Stream) -> bool {
    head.ident()
        .and_then(|name| interp.env().get(name))
        .map_or(false, |v| *v == Value::Stream(which))
}

fn call_state<'p>(e: &'p Expr, interp: &Interpreter, program: &'p Program) -> Option<CallState<'p>> {
    let ExprKind::Call { args, .. } = &e.kind else {
        return None;
    };
    let callee = interp.user_callee(e)?;
    let decl = match &callee.ptr {
        FuncPtr::User(d) => program.find_func(d)?,
        _ => return None,
    };
    Some(CallState {
        callee,
        decl,
        args,
        span: e.span,
        values: Vec::new(),
        entered: false,
        ret: None,
        failed: None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProgramPhase {
    Begin,
    Body,
    End,
}

struct ProgramState<'p> {
    program: &'p Program,
    main: Option<&'p FuncDecl>,
    phase: ProgramPhase,
}

impl<'p> ProgramState<'p> {
    fn new(program: &'p Program) -> Self {
        let main = program
            .functions()
            .find(|f| f.name == "main")
            .map(|f| f.as_ref());
        Self {
            program,
            main,
            phase: ProgramPhase::Begin,
        }
    }

    fn span(&self) -> Span {
        match (self.phase, self.main) {
            (ProgramPhase::Begin, Some(main)) => main.span,
            (_, Some(main)) => main.body.span.last_char(),
            (_, None) => Span::default(),
        }
    }

    fn settle(&mut self) -> Transition<'p> {
        if self.phase == ProgramPhase::Body {
            self.phase = ProgramPhase::End;
        }
        Transition::Stay
    }

    fn act(&mut self, interp: &mut Interpreter) -> Acted<'p> {
        let tr = interp.translator();
        if self.phase != ProgramPhase::Begin {
            interp.env_mut().pop();
            return Ok((tr.tr("The program ends.", &[]), Transition::Pop(None)));
        }
        let main = interp.prepare(self.program)?;
        let decl = match &main.ptr {
            FuncPtr::User(d) => self.program.find_func(d),
            _ => None,
        };
        let Some(decl) = decl else {
            return Err(EvalError::new(
                ErrorKind::NoMain,
                tr.tr("'main' is not a function.", &[]),
            ));
        };
        let args = interp
            .check_args(&main, Vec::new())
            .map_err(|e| e.at(decl.span.ini))?;
        interp.enter_function(decl, args);
        self.main = Some(decl);
        self.phase = ProgramPhase::Body;
        Ok((
            tr.tr("The program begins.", &[]),
            Transition::Push(State::Block(BlockState::new(&decl.body, false))),
        ))
    }
}

struct BlockState<'p> {
    block: &'p Block,
    next: usize,
    scoped: bool,
    entered: bool,
}

impl<'p> BlockState<'p> {
    fn new(block: &'p Block, scoped: bool) -> Self {
        Self {
            block,
            next: 0,
            scoped,
            entered: false,
        }
    }

    fn settle(&mut self, interp: &mut Interpreter, program: &'p Program) -> Transition<'p> {
        if self.scoped && !self.entered {
            interp.env_mut().push("<block>");
            self.entered = true;
        }
        let block = self.block;
        while let Some(stmt) = block.stmts.get(self.next) {
            self.next += 1;
            if !matches!(stmt.kind, StmtKind::Empty) {
                return Transition::Push(state_for(stmt, interp, program));
            }
        }
        if mem::take(&mut self.entered) {
            interp.env_mut().pop();
        }
        Transition::Pop(None)
    }
}

struct IfState<'p> {
    cond: &'p Expr,
    then: &'p Stmt,
    els: Option<&'p Stmt>,
    decided: bool,
}

impl<'p> IfState<'p> {
    fn act(&mut self, interp: &mut Interpreter, program: &'p Program) -> Acted<'p> {
        let tr = interp.translator();
        let taken = interp.condition(self.cond, "if")?;
        self.decided = true;
        if taken {
            return Ok((
                tr.tr("The condition is 'true', we take the first branch.", &[]),
                Transition::Push(state_for(self.then, interp, program)),
            ));
        }
        match self.els {
            Some(els) => Ok((
                tr.tr("The condition is 'false', we take the second branch.", &[]),
                Transition::Push(state_for(els, interp, program)),
            )),
            None => Ok((
                tr.tr("The condition is 'false', we continue.", &[]),
                Transition::Pop(None),
            )),
        }
    }
}

struct WhileState<'p> {
    cond: &'p Expr,
    body: &'p Stmt,
    entered: bool,
}

impl<'p> WhileState<'p> {
    fn act(&mut self, interp: &mut Interpreter, program: &'p Program) -> Acted<'p> {
        let tr = interp.translator();
        if interp.condition(self.cond, "while")? {
            return Ok((
                tr.tr("The condition is 'true', we enter the %s.", &[&"while"]),
                Transition::Push(state_for(self.body, interp, program)),
            ));
        }
        if mem::take(&mut self.entered) {
            interp.env_mut().pop();
        }
        Ok((
            tr.tr("The condition is 'false', we exit the %s.", &[&"while"]),
            Transition::Pop(None),
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForPhase {
    Init,
    Cond,
    Body,
    Post,
}

struct ForState<'p> {
    init: Option<&'p Stmt>,
    cond: &'p Expr,
    post: Option<&'p Expr>,
    body: &'p Stmt,
    phase: ForPhase,
    entered: bool,
}

impl<'p> ForState<'p> {
    fn span(&self) -> Span {
        match (self.phase, self.post) {
            (ForPhase::Post, Some(post)) => post.span,
            _ => self.cond.span,
        }
    }

    fn settle(&mut self, interp: &mut Interpreter, program: &'p Program) -> Transition<'p> {
        if !self.entered {
            interp.env_mut().push("for");
            self.entered = true;
        }
        match self.phase {
            ForPhase::Init => {
                self.phase = ForPhase::Cond;
                if let Some(init) = self.init {
                    return Transition::Push(state_for(init, interp, program));
                }
            }
            ForPhase::Body => {
                self.phase = if self.post.is_some() {
                    ForPhase::Post
                } else {
                    ForPhase::Cond
                };
            }
            ForPhase::Cond | ForPhase::Post => {}
        }
        Transition::Stay
    }

    fn act(&mut self, interp: &mut Interpreter, program: &'p Program) -> Acted<'p> {
        let tr = interp.translator();
        if let (ForPhase::Post, Some(post)) = (self.phase, self.post) {
            let v = interp.eval_rvalue(post)?;
            self.phase = ForPhase::Cond;
            return Ok((
                tr.tr("The expression evaluated to %s.", &[&v.repr()]),
                Transition::Stay,
            ));
        }
        if interp.condition(self.cond, "for")? {
            self.phase = ForPhase::Body;
            return Ok((
                tr.tr("The condition is 'true', we enter the %s.", &[&"for"]),
                Transition::Push(state_for(self.body, interp, program)),
            ));
        }
        if mem::take(&mut self.entered) {
            interp.env_mut().pop();
        }
        Ok((
            tr.tr("The condition is 'false', we exit the %s.", &[&"for"]),
            Transition::Pop(None),
        ))
    }
}

/// Call to a user function: one step per argument, then the jump.
struct CallState<'p> {
    callee: Rc<Callable>,
    decl: &'p FuncDecl,
    args: &'p [Expr],
    span: Span,
    values: Vec<Value>,
    entered: bool,
    ret: Option<Value>,
    failed: Option<EvalError>,
}

impl<'p> CallState<'p> {
    fn span(&self) -> Span {
        match self.args.get(self.values.len()) {
            Some(arg) if !self.entered => arg.span,
            _ => self.span,
        }
    }

    fn settle(&mut self, interp: &mut Interpreter) -> Transition<'p> {
        if !self.entered || self.failed.is_some() {
            return Transition::Stay;
        }
        // body finished, by falling off its end or by `return`
        interp.env_mut().pop();
        match interp.finish_call(&self.callee, self.ret.take()) {
            Ok(value) => Transition::Pop(Some(value)),
            Err(e) => {
                // reported by the next step, which is the call's own
                self.failed = Some(e.at(self.span.ini));
                Transition::Stay
            }
        }
    }

    fn act(&mut self, interp: &mut Interpreter) -> Acted<'p> {
        if let Some(e) = self.failed.take() {
            return Err(e);
        }
        let tr = interp.translator();
        let index = self.values.len();
        if let Some(arg) = self.args.get(index) {
            let v = interp.eval_expr(arg)?;
            self.values.push(v);
            return Ok((tr.parameter_status(index), Transition::Stay));
        }
        let args = interp
            .check_args(&self.callee, mem::take(&mut self.values))
            .map_err(|e| e.at(self.span.ini))?;
        let decl = self.decl;
        interp.enter_function(decl, args);
        self.entered = true;
        Ok((
            tr.tr("We jump to function '%s'.", &[&decl.name]),
            Transition::Push(State::Block(BlockState::new(&decl.body, false))),
        ))
    }
}

/// `lhs = rhs`, stepping into `rhs` when it is a user call.
struct AssignState<'p> {
    left: &'p Expr,
    right: &'p Expr,
    span: Span,
    target: Option<EvalResult<Value>>,
    pending: Option<Value>,
    awaiting: bool,
}

impl<'p> AssignState<'p> {
    fn settle(&mut self, interp: &mut Interpreter, program: &'p Program) -> Transition<'p> {
        let target = self.target.get_or_insert_with(|| interp.eval_expr(self.left));
        if target.is_ok() && !self.awaiting {
            self.awaiting = true;
            if let Some(call) = call_state(self.right, interp, program) {
                return Transition::Push(State::Call(call));
            }
        }
        Transition::Stay
    }

    fn act(&mut self, interp: &mut Interpreter) -> Acted<'p> {
        let target = match self.target.take() {
            Some(target) => target?,
            None => interp.eval_expr(self.left)?,
        };
        let r = match self.pending.take() {
            Some(v) => v,
            None => interp.eval_rvalue(self.right)?,
        };
        interp
            .assign(BinOp::Assign, target, r)
            .map_err(|e| e.at(self.span.ini))?;
        Ok((
            interp.translator().tr("We assign the value.", &[]),
            Transition::Pop(None),
        ))
    }
}

/// `cout << a << b`: one step per operand.
struct WriteState<'p> {
    head: &'p Expr,
    operands: Vec<&'p Expr>,
    next: usize,
    started: bool,
}

impl<'p> WriteState<'p> {
    fn span(&self) -> Span {
        self.operands
            .get(self.next)
            .map_or(self.head.span, |e| e.span)
    }

    fn settle(&self) -> Transition<'p> {
        if self.next < self.operands.len() {
            Transition::Stay
        } else {
            Transition::Pop(None)
        }
    }

    fn act(&mut self, interp: &mut Interpreter) -> Acted<'p> {
        if !self.started {
            interp.eval_expr(self.head)?;
            self.started = true;
        }
        let Some(&operand) = self.operands.get(self.next) else {
            return Ok((String::new(), Transition::Pop(None)));
        };
        let v = interp.eval_rvalue(operand)?;
        interp
            .write_value(&v)
            .map_err(|e| e.at(operand.span.ini))?;
        self.next += 1;
        let status = interp.translator().tr("Some output is written.", &[]);
        if self.next < self.operands.len() {
            Ok((status, Transition::Stay))
        } else {
            Ok((status, Transition::Pop(None)))
        }
    }
}

/// Declaration statement. Items whose initializer is a user call are
/// stepped into; runs of other items are declared together in one step.
struct DeclState<'p> {
    decl: &'p DeclStmt,
    next: usize,
    pending: Option<Value>,
    awaiting: bool,
}

impl<'p> DeclState<'p> {
    fn user_call(&self, interp: &Interpreter, program: &'p Program, i: usize) -> Option<CallState<'p>> {
        let decl = self.decl;
        let item = decl.items.get(i)?;
        if !matches!(item.kind, Declarator::Var) {
            return None;
        }
        call_state(item.init.as_ref()?, interp, program)
    }

    fn settle(&mut self, interp: &mut Interpreter, program: &'p Program) -> Transition<'p> {
        if self.next >= self.decl.items.len() {
            return Transition::Pop(None);
        }
        if self.pending.is_none() && !self.awaiting {
            self.awaiting = true;
            if let Some(call) = self.user_call(interp, program, self.next) {
                return Transition::Push(State::Call(call));
            }
        }
        Transition::Stay
    }

    fn act(&mut self, interp: &mut Interpreter, program: &'p Program) -> Acted<'p> {
        let decl = self.decl;
        let mut names = Vec::new();
        loop {
            interp.declare_item_at(decl, self.next, self.pending.take())?;
            if let Some(item) = decl.items.get(self.next) {
                names.push(item.name.as_str());
            }
            self.next += 1;
            self.awaiting = false;
            if self.next >= decl.items.len() || self.user_call(interp, program, self.next).is_some() {
                break;
            }
        }
        let tr = interp.translator();
        let status = match names.as_slice() {
            [one] => tr.tr("Variable '%s' is declared.", &[one]),
            _ => tr.tr("Variables %s are declared.", &[&tr.join_names(&names)]),
        };
        if self.next >= decl.items.len() {
            Ok((status, Transition::Pop(None)))
        } else {
            Ok((status, Transition::Stay))
        }
    }
}

struct ReturnState<'p> {
    expr: Option<&'p Expr>,
    span: Span,
    value: Option<Value>,
    awaiting: bool,
}

impl<'p> ReturnState<'p> {
    fn settle(&mut self, interp: &mut Interpreter, program: &'p Program) -> Transition<'p> {
        if let (Some(e), false) = (self.expr, self.awaiting) {
            self.awaiting = true;
            if let Some(call) = call_state(e, interp, program) {
                return Transition::Push(State::Call(call));
            }
        }
        Transition::Stay
    }

    fn act(&mut self, interp: &mut Interpreter) -> Acted<'p> {
        let tr = interp.translator();
        let value = match (self.value.take(), self.expr) {
            (Some(v), _) => v,
            (None, Some(e)) => interp.eval_rvalue(e)?,
            (None, None) => {
                return Ok((
                    tr.tr("We return from the function.", &[]),
                    Transition::Unwind(None),
                ))
            }
        };
        Ok((
            tr.tr("%s is returned.", &[&value.repr()]),
            Transition::Unwind(Some(value)),
        ))
    }
}

/// Any other expression statement, evaluated in one step.
struct EvalState<'p> {
    expr: Option<&'p Expr>,
    span: Span,
}

impl<'p> EvalState<'p> {
    fn act(&mut self, interp: &mut Interpreter) -> Acted<'p> {
        let tr = interp.translator();
        let Some(e) = self.expr else {
            return Ok((String::new(), Transition::Pop(None)));
        };
        let reads = matches!(e.kind, ExprKind::Binary { op: BinOp::Shr, .. })
            && is_stream(interp, e.chain_head(BinOp::Shr), Stream::Cin);
        let v = interp.eval_rvalue(e)?;
        let status = if reads {
            tr.tr("Some input is read.", &[])
        } else {
            tr.tr("The expression evaluated to %s.", &[&v.repr()])
        };
        Ok((status, Transition::Pop(None)))
    }
}

/// Drives one program one visible step at a time.
///
/// Output written by the program is buffered and handed out by
/// [`Stepper::output`]; an evaluation error stops the run and is kept for
/// [`Stepper::error`].
pub struct Stepper<'p> {
    interp: Interpreter,
    program: Option<&'p Program>,
    stack: Vec<State<'p>>,
    output: SharedBuffer,
    status: String,
    error: Option<EvalError>,
}

impl<'p> Stepper<'p> {
    pub fn new(tr: Translator) -> Self {
        Self::with_input(Input::empty(), tr)
    }

    pub fn with_input(input: Input, tr: Translator) -> Self {
        let output = SharedBuffer::new();
        let interp = Interpreter::new(input, Box::new(output.clone()), tr);
        Self {
            interp,
            program: None,
            stack: Vec::new(),
            output,
            status: String::new(),
            error: None,
        }
    }

    /// Load `program`. Nothing runs until the first [`step`](Self::step).
    pub fn start(&mut self, program: &'p Program) {
        debug!("stepper started");
        self.program = Some(program);
        self.stack = vec![State::Program(ProgramState::new(program))];
        self.status.clear();
        self.error = None;
        self.settle();
    }

    /// Perform one visible step. Returns `false` once an error was raised.
    pub fn step(&mut self) -> bool {
        if self.error.is_some() {
            return false;
        }
        let result = self.advance();
        self.record(result)
    }

    /// Step until the program ends or fails.
    pub fn run_to_end(&mut self) -> bool {
        while !self.finished() {
            if !self.step() {
                return false;
            }
        }
        self.error.is_none()
    }

    pub fn finished(&self) -> bool {
        self.stack.is_empty()
    }

    /// Source range the next step works on.
    pub fn span(&self) -> Option<Span> {
        self.stack.last().map(|s| s.span())
    }

    /// Description of the most recent step.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn error(&self) -> Option<&EvalError> {
        self.error.as_ref()
    }

    /// Output written since the previous call.
    pub fn output(&mut self) -> String {
        self.output.take()
    }

    pub fn env(&self) -> &Environment {
        self.interp.env()
    }

    pub fn env_json(&self) -> serde_json::Value {
        self.interp.env().to_json()
    }

    fn record(&mut self, result: EvalResult<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "step failed");
                self.error = Some(e);
                self.stack.clear();
                false
            }
        }
    }

    fn advance(&mut self) -> EvalResult<()> {
        let Some(program) = self.program else {
            return Ok(());
        };
        let Some(top) = self.stack.last_mut() else {
            return Ok(());
        };
        let (status, transition) = top.act(&mut self.interp, program)?;
        trace!(state = top.name(), status = %status, "step");
        self.status = status;
        self.apply(transition);
        self.settle();
        Ok(())
    }

    fn settle(&mut self) {
        let Some(program) = self.program else {
            return;
        };
        while let Some(top) = self.stack.last_mut() {
            match top.settle(&mut self.interp, program) {
                Transition::Stay => return,
                other => self.apply(other),
            }
        }
    }

    fn apply(&mut self, transition: Transition<'p>) {
        match transition {
            Transition::Stay => {}
            Transition::Push(state) => {
                trace!(state = state.name(), depth = self.stack.len() + 1, "push state");
                self.stack.push(state);
            }
            Transition::Pop(value) => {
                if let Some(state) = self.stack.pop() {
                    trace!(state = state.name(), depth = self.stack.len(), "pop state");
                }
                self.deliver(value);
            }
            Transition::Unwind(value) => {
                while let Some(top) = self.stack.last_mut() {
                    if top.is_frame() {
                        break;
                    }
                    top.leave(&mut self.interp);
                    self.stack.pop();
                }
                self.deliver(value);
            }
        }
    }

    fn deliver(&mut self, value: Option<Value>) {
        if let (Some(value), Some(top)) = (value, self.stack.last_mut()) {
            top.receive(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_source;

    fn excerpts(src: &str) -> Vec<String> {
        let program = parse_source(src).unwrap();
        let mut stepper = Stepper::new(Translator::default());
        stepper.start(&program);
        let mut seen = Vec::new();
        while let Some(span) = stepper.span() {
            seen.push(span.excerpt(src).to_string());
            assert!(stepper.step(), "{:?}", stepper.error());
        }
        seen
    }

    #[test]
    fn while_loop_interleaving() {
        let src = "int main() {\n  int i = 0;\n  while (i < 2) {\n    i = i + 1;\n  }\n}\n";
        let seen = excerpts(src);
        assert_eq!(seen.len(), 8);
        assert!(seen[0].starts_with("int main()"));
        assert_eq!(
            &seen[1..7],
            &[
                "int i = 0;",
                "i < 2",
                "i = i + 1;",
                "i < 2",
                "i = i + 1;",
                "i < 2"
            ]
        );
        assert_eq!(seen[7], "}");
    }

    #[test]
    fn call_steps_arguments_then_jumps() {
        let src = "int sq(int x) { return x * x; }\nint main() { int y = sq(3); }\n";
        let program = parse_source(src).unwrap();
        let mut stepper = Stepper::new(Translator::default());
        stepper.start(&program);
        let mut statuses = Vec::new();
        while !stepper.finished() {
            assert!(stepper.step());
            statuses.push(stepper.status().to_string());
        }
        assert_eq!(
            statuses,
            [
                "The program begins.",
                "We evaluate the first parameter.",
                "We jump to function 'sq'.",
                "9 is returned.",
                "Variable 'y' is declared.",
                "The program ends.",
            ]
        );
    }

    #[test]
    fn error_stops_the_run() {
        let src = "int main() { int x = 1; x = y; }";
        let program = parse_source(src).unwrap();
        let mut stepper = Stepper::new(Translator::default());
        stepper.start(&program);
        assert!(stepper.step());
        assert!(stepper.step());
        assert!(!stepper.step());
        assert!(stepper.finished());
        let err = stepper.error().unwrap();
        assert_eq!(err.kind, ErrorKind::Name);
        assert!(!stepper.step());
    }
}
