use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub col: usize,
    pub offset: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.line, self.col)
    }
}

/// Source range of a node. `fin` points just past the last character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub ini: Pos,
    pub fin: Pos,
}

impl Span {
    pub fn new(ini: Pos, fin: Pos) -> Self {
        Self { ini, fin }
    }

    pub fn to(self, other: Span) -> Span {
        Span::new(self.ini, other.fin)
    }

    /// One-character span ending where this one ends, e.g. a closing brace.
    pub fn last_char(&self) -> Span {
        let mut ini = self.fin;
        ini.col = ini.col.saturating_sub(1);
        ini.offset = ini.offset.saturating_sub(1);
        Span::new(ini, self.fin)
    }

    /// The slice of `src` covered by this span (empty if out of range).
    pub fn excerpt<'s>(&self, src: &'s str) -> &'s str {
        src.get(self.ini.offset..self.fin.offset).unwrap_or("")
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{}:{}",
            self.ini.line, self.ini.col, self.fin.line, self.fin.col
        )
    }
}

#[derive(Debug, Clone)]
pub struct Program {
    pub items: Vec<Item>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = &Rc<FuncDecl>> {
        self.items.iter().filter_map(|it| match it {
            Item::Func(f) => Some(f),
            _ => None,
        })
    }

    /// Resolve a shared declaration back to the node owned by this program.
    pub fn find_func(&self, decl: &Rc<FuncDecl>) -> Option<&FuncDecl> {
        self.functions()
            .find(|f| Rc::ptr_eq(f, decl))
            .map(|f| f.as_ref())
    }
}

#[derive(Debug, Clone)]
pub enum Item {
    Include(String, Span),
    Using(String, Span),
    Func(Rc<FuncDecl>),
    Struct(StructDecl),
    Decl(Stmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeSpec {
    pub name: String,
    pub args: Vec<TypeSpec>,
    pub is_const: bool,
    pub reference: bool,
    pub span: Span,
}

impl TypeSpec {
    pub fn is_void(&self) -> bool {
        self.name == "void" && !self.reference
    }

    /// Canonical text of the specifier without qualifiers, e.g. `vector<int>`.
    pub fn type_str(&self) -> String {
        if self.args.is_empty() {
            self.name.clone()
        } else {
            let args: Vec<String> = self.args.iter().map(|a| a.type_str()).collect();
            format!("{}<{}>", self.name, args.join(","))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeSpec,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub return_type: TypeSpec,
    pub params: Vec<Param>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<DeclStmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block(Block),
    Expr(Expr),
    Return(Option<Expr>),
    Decl(DeclStmt),
    If {
        cond: Expr,
        then: Box<Stmt>,
        els: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Expr,
        post: Option<Expr>,
        body: Box<Stmt>,
    },
    Empty,
}

#[derive(Debug, Clone)]
pub struct DeclStmt {
    pub ty: TypeSpec,
    pub items: Vec<DeclItem>,
    pub span: Span,
}

impl DeclStmt {
    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|it| it.name.as_str()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct DeclItem {
    pub name: String,
    pub kind: Declarator,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Declarator {
    Var,
    Array(Expr),
    Object(Vec<Expr>),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Ident(String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Field {
        base: Box<Expr>,
        field: String,
    },
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    List(Vec<Expr>),
    Sign {
        negative: bool,
        expr: Box<Expr>,
    },
    Incr {
        decrement: bool,
        prefix: bool,
        expr: Box<Expr>,
    },
    Not(Box<Expr>),
}

impl Expr {
    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_assignment(&self) -> bool {
        matches!(&self.kind, ExprKind::Binary { op: BinOp::Assign, .. })
    }

    /// Leftmost operand of a `<<`/`>>` chain, e.g. `cout` in `cout << a << b`.
    pub fn chain_head(&self, op: BinOp) -> &Expr {
        match &self.kind {
            ExprKind::Binary { op: o, left, .. } if *o == op => left.chain_head(op),
            _ => self,
        }
    }

    /// Right operands of a `<<`/`>>` chain in source order.
    pub fn collect_rights(&self, op: BinOp) -> Vec<&Expr> {
        let mut out = Vec::new();
        let mut node = self;
        while let ExprKind::Binary { op: o, left, right } = &node.kind {
            if *o != op {
                break;
            }
            out.push(right.as_ref());
            node = left;
        }
        out.reverse();
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int(i32),
    Float(f32),
    Double(f64),
    Char(char),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    Or,
    And,
    BitOr,
    BitXor,
    BitAnd,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Assign => "=",
            BinOp::AddAssign => "+=",
            BinOp::SubAssign => "-=",
            BinOp::MulAssign => "*=",
            BinOp::DivAssign => "/=",
            BinOp::ModAssign => "%=",
            BinOp::AndAssign => "&=",
            BinOp::OrAssign => "|=",
            BinOp::XorAssign => "^=",
            BinOp::Or => "||",
            BinOp::And => "&&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
        }
    }

    pub fn is_assignment(self) -> bool {
        matches!(
            self,
            BinOp::Assign
                | BinOp::AddAssign
                | BinOp::SubAssign
                | BinOp::MulAssign
                | BinOp::DivAssign
                | BinOp::ModAssign
                | BinOp::AndAssign
                | BinOp::OrAssign
                | BinOp::XorAssign
        )
    }

    /// The plain operator behind a compound assignment (`+=` -> `+`).
    pub fn compound_base(self) -> Option<BinOp> {
        Some(match self {
            BinOp::AddAssign => BinOp::Add,
            BinOp::SubAssign => BinOp::Sub,
            BinOp::MulAssign => BinOp::Mul,
            BinOp::DivAssign => BinOp::Div,
            BinOp::ModAssign => BinOp::Mod,
            BinOp::AndAssign => BinOp::BitAnd,
            BinOp::OrAssign => BinOp::BitOr,
            BinOp::XorAssign => BinOp::BitXor,
            _ => return None,
        })
    }
}
