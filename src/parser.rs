use std::collections::HashSet;
use std::rc::Rc;

use anyhow::{anyhow, bail, Result};

use crate::ast::*;
use crate::lexer::{Token, TokenKind};

const BASIC_TYPE_NAMES: &[&str] = &[
    "int", "float", "double", "bool", "char", "string", "void", "vector",
];

// Binary precedence levels, loosest first. Each level is left-associative.
const BINARY_LEVELS: &[&[(TokenKind, BinOp)]] = &[
    &[(TokenKind::PipePipe, BinOp::Or)],
    &[(TokenKind::AmpAmp, BinOp::And)],
    &[(TokenKind::Pipe, BinOp::BitOr)],
    &[(TokenKind::Caret, BinOp::BitXor)],
    &[(TokenKind::Amp, BinOp::BitAnd)],
    &[
        (TokenKind::EqualEqual, BinOp::Eq),
        (TokenKind::BangEqual, BinOp::Ne),
    ],
    &[
        (TokenKind::Less, BinOp::Lt),
        (TokenKind::LessEqual, BinOp::Le),
        (TokenKind::Greater, BinOp::Gt),
        (TokenKind::GreaterEqual, BinOp::Ge),
    ],
    &[
        (TokenKind::LessLess, BinOp::Shl),
        (TokenKind::GreaterGreater, BinOp::Shr),
    ],
    &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
    &[
        (TokenKind::Star, BinOp::Mul),
        (TokenKind::Slash, BinOp::Div),
        (TokenKind::Percent, BinOp::Mod),
    ],
];

pub fn parse(tokens: Vec<Token>) -> Result<Program> {
    let mut p = Parser {
        tokens,
        pos: 0,
        struct_names: HashSet::new(),
    };
    p.parse_program()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    struct_names: HashSet<String>, // names usable as type specifiers
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }
    fn peek_is(&self, k: TokenKind) -> bool {
        self.peek().map(|t| t.kind) == Some(k)
    }
    fn peek_n_is(&self, n: usize, k: TokenKind) -> bool {
        self.tokens.get(self.pos + n).map(|t| t.kind) == Some(k)
    }
    fn peek_text(&self) -> &str {
        self.peek().map(|t| t.text.as_str()).unwrap_or("")
    }
    fn bump(&mut self) -> Result<Token> {
        let t = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| anyhow!("{}: unexpected end of input", self.here()))?;
        self.pos += 1;
        Ok(t)
    }
    fn eat(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        if self.peek_is(kind) {
            return self.bump();
        }
        match self.peek() {
            Some(t) => bail!("{}: expected '{}' here, found '{}'", t.ini, what, t.text),
            None => bail!("{}: expected '{}' but end of text found", self.here(), what),
        }
    }
    fn eat_ident(&mut self) -> Result<Token> {
        if self.peek_is(TokenKind::Ident) {
            return self.bump();
        }
        bail!("{}: expected an identifier here", self.here())
    }
    fn here(&self) -> Pos {
        match self.peek() {
            Some(t) => t.ini,
            None => self.prev_fin(),
        }
    }
    fn prev_fin(&self) -> Pos {
        if self.pos == 0 {
            return Pos::default();
        }
        self.tokens
            .get(self.pos - 1)
            .or_else(|| self.tokens.last())
            .map(|t| t.fin)
            .unwrap_or_default()
    }
    fn span_from(&self, ini: Pos) -> Span {
        Span::new(ini, self.prev_fin())
    }

    fn skip_std_prefix(&mut self) {
        if self.peek_text() == "std" && self.peek_n_is(1, TokenKind::ColonColon) {
            self.pos += 2;
        }
    }

    fn is_type_start(&self) -> bool {
        let mut n = 0;
        if self.peek_is(TokenKind::Const) {
            return true;
        }
        if self.peek_text() == "std" && self.peek_n_is(1, TokenKind::ColonColon) {
            n = 2;
        }
        match self.tokens.get(self.pos + n) {
            Some(t) if t.kind == TokenKind::Ident => {
                BASIC_TYPE_NAMES.contains(&t.text.as_str()) || self.struct_names.contains(&t.text)
            }
            _ => false,
        }
    }

    fn parse_program(&mut self) -> Result<Program> {
        let mut items = Vec::new();
        while let Some(kind) = self.peek().map(|t| t.kind) {
            match kind {
                TokenKind::Directive => {
                    let tok = self.bump()?;
                    let span = Span::new(tok.ini, tok.fin);
                    if let Some(rest) = tok.text.trim_start_matches('#').trim().strip_prefix("include") {
                        let name = rest.trim().trim_matches(|c| c == '<' || c == '>' || c == '"');
                        items.push(Item::Include(name.to_string(), span));
                    }
                }
                TokenKind::Using => {
                    let ini = self.bump()?.ini;
                    self.eat(TokenKind::Namespace, "namespace")?;
                    let ns = self.eat_ident()?.text;
                    self.eat(TokenKind::Semi, ";")?;
                    items.push(Item::Using(ns, self.span_from(ini)));
                }
                TokenKind::Struct => items.push(Item::Struct(self.parse_struct()?)),
                _ if self.is_type_start() => {
                    let ty = self.parse_typespec()?;
                    let name = self.eat_ident()?;
                    if self.peek_is(TokenKind::LParen) {
                        items.push(Item::Func(Rc::new(self.parse_function(ty, name)?)));
                    } else {
                        let ini = ty.span.ini;
                        let decl = self.parse_decl_rest(ty, name)?;
                        items.push(Item::Decl(Stmt {
                            kind: StmtKind::Decl(decl),
                            span: self.span_from(ini),
                        }));
                    }
                }
                _ => bail!("{}: unexpected '{}' here", self.here(), self.peek_text()),
            }
        }
        Ok(Program { items })
    }

    fn parse_struct(&mut self) -> Result<StructDecl> {
        let ini = self.eat(TokenKind::Struct, "struct")?.ini;
        let name = self.eat_ident()?.text;
        // Register first so fields of the same type name parse as declarations.
        self.struct_names.insert(name.clone());
        self.eat(TokenKind::LBrace, "{")?;
        let mut fields = Vec::new();
        while !self.peek_is(TokenKind::RBrace) {
            if !self.is_type_start() {
                bail!("{}: expected a field declaration here", self.here());
            }
            fields.push(self.parse_decl()?);
        }
        self.eat(TokenKind::RBrace, "}")?;
        self.eat(TokenKind::Semi, ";")?;
        Ok(StructDecl {
            name,
            fields,
            span: self.span_from(ini),
        })
    }

    fn parse_typespec(&mut self) -> Result<TypeSpec> {
        let ini = self.here();
        let is_const = if self.peek_is(TokenKind::Const) {
            self.bump()?;
            true
        } else {
            false
        };
        self.skip_std_prefix();
        let name = self.eat_ident()?.text;
        let mut args = Vec::new();
        if self.peek_is(TokenKind::Less) {
            self.bump()?;
            loop {
                args.push(self.parse_typespec()?);
                if self.peek_is(TokenKind::Comma) {
                    self.bump()?;
                    continue;
                }
                break;
            }
            self.eat_template_close()?;
        }
        let reference = if self.peek_is(TokenKind::Amp) {
            self.bump()?;
            true
        } else {
            false
        };
        Ok(TypeSpec {
            name,
            args,
            is_const,
            reference,
            span: self.span_from(ini),
        })
    }

    // `vector<vector<int>>` lexes its closer as one `>>` token; split it.
    fn eat_template_close(&mut self) -> Result<()> {
        if self.peek_is(TokenKind::GreaterGreater) {
            let tok = &mut self.tokens[self.pos];
            tok.kind = TokenKind::Greater;
            tok.text = ">".to_string();
            tok.ini.col += 1;
            tok.ini.offset += 1;
            return Ok(());
        }
        self.eat(TokenKind::Greater, ">")?;
        Ok(())
    }

    fn parse_function(&mut self, return_type: TypeSpec, name: Token) -> Result<FuncDecl> {
        let ini = return_type.span.ini;
        self.eat(TokenKind::LParen, "(")?;
        let mut params = Vec::new();
        if self.peek_text() == "void" && self.peek_n_is(1, TokenKind::RParen) {
            self.bump()?;
        }
        if !self.peek_is(TokenKind::RParen) {
            loop {
                let ty = self.parse_typespec()?;
                let pname = self.eat_ident()?;
                params.push(Param {
                    name: pname.text,
                    span: Span::new(ty.span.ini, pname.fin),
                    ty,
                });
                if self.peek_is(TokenKind::Comma) {
                    self.bump()?;
                    continue;
                }
                break;
            }
        }
        self.eat(TokenKind::RParen, ")")?;
        let body = self.parse_block()?;
        Ok(FuncDecl {
            name: name.text,
            return_type,
            params,
            body,
            span: self.span_from(ini),
        })
    }

    fn parse_block(&mut self) -> Result<Block> {
        let ini = self.eat(TokenKind::LBrace, "{")?.ini;
        let mut stmts = Vec::new();
        while !self.peek_is(TokenKind::RBrace) {
            if self.peek().is_none() {
                bail!("{}: expected '}}' but end of text found", self.here());
            }
            stmts.push(self.parse_stmt()?);
        }
        self.eat(TokenKind::RBrace, "}")?;
        Ok(Block {
            stmts,
            span: self.span_from(ini),
        })
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let ini = self.here();
        let kind = match self.peek().map(|t| t.kind) {
            Some(TokenKind::LBrace) => StmtKind::Block(self.parse_block()?),
            Some(TokenKind::Semi) => {
                self.bump()?;
                StmtKind::Empty
            }
            Some(TokenKind::If) => {
                self.bump()?;
                self.eat(TokenKind::LParen, "(")?;
                let cond = self.parse_expr()?;
                self.eat(TokenKind::RParen, ")")?;
                let then = Box::new(self.parse_stmt()?);
                let els = if self.peek_is(TokenKind::Else) {
                    self.bump()?;
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                StmtKind::If { cond, then, els }
            }
            Some(TokenKind::While) => {
                self.bump()?;
                self.eat(TokenKind::LParen, "(")?;
                let cond = self.parse_expr()?;
                self.eat(TokenKind::RParen, ")")?;
                let body = Box::new(self.parse_stmt()?);
                StmtKind::While { cond, body }
            }
            Some(TokenKind::For) => self.parse_for()?,
            Some(TokenKind::Return) => {
                self.bump()?;
                let value = if self.peek_is(TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.eat(TokenKind::Semi, ";")?;
                StmtKind::Return(value)
            }
            Some(TokenKind::Break) | Some(TokenKind::Continue) => {
                bail!("{}: '{}' is not supported", ini, self.peek_text())
            }
            Some(_) if self.is_type_start() => StmtKind::Decl(self.parse_decl()?),
            Some(_) => {
                let e = self.parse_expr()?;
                self.eat(TokenKind::Semi, ";")?;
                StmtKind::Expr(e)
            }
            None => bail!("{}: unexpected end of input", ini),
        };
        Ok(Stmt {
            kind,
            span: self.span_from(ini),
        })
    }

    fn parse_for(&mut self) -> Result<StmtKind> {
        self.eat(TokenKind::For, "for")?;
        self.eat(TokenKind::LParen, "(")?;
        let init = if self.peek_is(TokenKind::Semi) {
            self.bump()?;
            None
        } else {
            // declaration or expression statement, both consume the ';'
            Some(Box::new(self.parse_stmt()?))
        };
        let cond = if self.peek_is(TokenKind::Semi) {
            let at = self.here();
            Expr {
                kind: ExprKind::Literal(Literal::Bool(true)),
                span: Span::new(at, at),
            }
        } else {
            self.parse_expr()?
        };
        self.eat(TokenKind::Semi, ";")?;
        let post = if self.peek_is(TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expr()?)
        };
        self.eat(TokenKind::RParen, ")")?;
        let body = Box::new(self.parse_stmt()?);
        Ok(StmtKind::For {
            init,
            cond,
            post,
            body,
        })
    }

    fn parse_decl(&mut self) -> Result<DeclStmt> {
        let ty = self.parse_typespec()?;
        let name = self.eat_ident()?;
        self.parse_decl_rest(ty, name)
    }

    // Declarators after the type and the first name: `a[3] = {..}, b(1), c;`
    fn parse_decl_rest(&mut self, ty: TypeSpec, first: Token) -> Result<DeclStmt> {
        let ini = ty.span.ini;
        let mut items = Vec::new();
        let mut name = first;
        loop {
            let kind = if self.peek_is(TokenKind::LBracket) {
                self.bump()?;
                let size = self.parse_expr()?;
                self.eat(TokenKind::RBracket, "]")?;
                Declarator::Array(size)
            } else if self.peek_is(TokenKind::LParen) {
                Declarator::Object(self.parse_args()?)
            } else {
                Declarator::Var
            };
            let init = if self.peek_is(TokenKind::Equal) {
                self.bump()?;
                Some(self.parse_assignment()?)
            } else {
                None
            };
            items.push(DeclItem {
                name: name.text.clone(),
                kind,
                init,
                span: self.span_from(name.ini),
            });
            if self.peek_is(TokenKind::Comma) {
                self.bump()?;
                name = self.eat_ident()?;
                continue;
            }
            break;
        }
        self.eat(TokenKind::Semi, ";")?;
        Ok(DeclStmt {
            ty,
            items,
            span: self.span_from(ini),
        })
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>> {
        self.eat(TokenKind::LParen, "(")?;
        let mut args = Vec::new();
        if !self.peek_is(TokenKind::RParen) {
            args.push(self.parse_assignment()?);
            while self.peek_is(TokenKind::Comma) {
                self.bump()?;
                args.push(self.parse_assignment()?);
            }
        }
        self.eat(TokenKind::RParen, ")")?;
        Ok(args)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr> {
        let left = self.parse_conditional()?;
        let op = match self.peek().map(|t| t.kind) {
            Some(TokenKind::Equal) => BinOp::Assign,
            Some(TokenKind::PlusEqual) => BinOp::AddAssign,
            Some(TokenKind::MinusEqual) => BinOp::SubAssign,
            Some(TokenKind::StarEqual) => BinOp::MulAssign,
            Some(TokenKind::SlashEqual) => BinOp::DivAssign,
            Some(TokenKind::PercentEqual) => BinOp::ModAssign,
            Some(TokenKind::AmpEqual) => BinOp::AndAssign,
            Some(TokenKind::PipeEqual) => BinOp::OrAssign,
            Some(TokenKind::CaretEqual) => BinOp::XorAssign,
            _ => return Ok(left),
        };
        self.bump()?;
        let right = self.parse_assignment()?;
        Ok(Expr {
            span: left.span.to(right.span),
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
        })
    }

    fn parse_conditional(&mut self) -> Result<Expr> {
        let cond = self.parse_binary(0)?;
        if !self.peek_is(TokenKind::Question) {
            return Ok(cond);
        }
        self.bump()?;
        let then = self.parse_assignment()?;
        self.eat(TokenKind::Colon, ":")?;
        let els = self.parse_conditional()?;
        Ok(Expr {
            span: cond.span.to(els.span),
            kind: ExprKind::Cond {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            },
        })
    }

    fn parse_binary(&mut self, level: usize) -> Result<Expr> {
        if level == BINARY_LEVELS.len() {
            return self.parse_unary();
        }
        let mut node = self.parse_binary(level + 1)?;
        'outer: loop {
            for (kind, op) in BINARY_LEVELS[level] {
                if self.peek_is(*kind) {
                    self.bump()?;
                    let rhs = self.parse_binary(level + 1)?;
                    node = Expr {
                        span: node.span.to(rhs.span),
                        kind: ExprKind::Binary {
                            op: *op,
                            left: Box::new(node),
                            right: Box::new(rhs),
                        },
                    };
                    continue 'outer;
                }
            }
            break;
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let ini = self.here();
        let kind = match self.peek().map(|t| t.kind) {
            Some(TokenKind::Bang) => {
                self.bump()?;
                ExprKind::Not(Box::new(self.parse_unary()?))
            }
            Some(TokenKind::Minus) | Some(TokenKind::Plus) => {
                let negative = self.bump()?.kind == TokenKind::Minus;
                ExprKind::Sign {
                    negative,
                    expr: Box::new(self.parse_unary()?),
                }
            }
            Some(TokenKind::PlusPlus) | Some(TokenKind::MinusMinus) => {
                let decrement = self.bump()?.kind == TokenKind::MinusMinus;
                ExprKind::Incr {
                    decrement,
                    prefix: true,
                    expr: Box::new(self.parse_unary()?),
                }
            }
            _ => return self.parse_postfix(),
        };
        Ok(Expr {
            kind,
            span: self.span_from(ini),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr> {
        let ini = self.here();
        let mut node = self.parse_primary()?;
        loop {
            let kind = match self.peek().map(|t| t.kind) {
                Some(TokenKind::LParen) => {
                    let args = self.parse_args()?;
                    ExprKind::Call {
                        func: Box::new(node),
                        args,
                    }
                }
                Some(TokenKind::LBracket) => {
                    self.bump()?;
                    let index = self.parse_expr()?;
                    self.eat(TokenKind::RBracket, "]")?;
                    ExprKind::Index {
                        base: Box::new(node),
                        index: Box::new(index),
                    }
                }
                Some(TokenKind::Dot) => {
                    self.bump()?;
                    let field = self.eat_ident()?.text;
                    ExprKind::Field {
                        base: Box::new(node),
                        field,
                    }
                }
                Some(TokenKind::PlusPlus) | Some(TokenKind::MinusMinus) => {
                    let decrement = self.bump()?.kind == TokenKind::MinusMinus;
                    ExprKind::Incr {
                        decrement,
                        prefix: false,
                        expr: Box::new(node),
                    }
                }
                _ => break,
            };
            node = Expr {
                kind,
                span: self.span_from(ini),
            };
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        self.skip_std_prefix();
        let tok = self.bump()?;
        let lit = |l: Literal| ExprKind::Literal(l);
        let kind = match tok.kind {
            TokenKind::True => lit(Literal::Bool(true)),
            TokenKind::False => lit(Literal::Bool(false)),
            TokenKind::Int => lit(Literal::Int(tok.text.parse().map_err(|_| {
                anyhow!("{}: integer literal '{}' is too large", tok.ini, tok.text)
            })?)),
            TokenKind::Double => lit(Literal::Double(tok.text.parse()?)),
            TokenKind::Float => lit(Literal::Float(tok.text.trim_end_matches('f').parse()?)),
            TokenKind::Char => {
                let inner = unescape(&tok.text[1..tok.text.len() - 1]);
                lit(Literal::Char(inner.chars().next().unwrap_or('\0')))
            }
            TokenKind::String => lit(Literal::String(unescape(&tok.text[1..tok.text.len() - 1]))),
            TokenKind::Ident => ExprKind::Ident(tok.text.clone()),
            TokenKind::LParen => {
                let inner = self.parse_expr()?;
                self.eat(TokenKind::RParen, ")")?;
                return Ok(Expr {
                    kind: inner.kind,
                    span: self.span_from(tok.ini),
                });
            }
            TokenKind::LBrace => {
                let mut elems = Vec::new();
                if !self.peek_is(TokenKind::RBrace) {
                    elems.push(self.parse_assignment()?);
                    while self.peek_is(TokenKind::Comma) {
                        self.bump()?;
                        if self.peek_is(TokenKind::RBrace) {
                            break; // trailing comma
                        }
                        elems.push(self.parse_assignment()?);
                    }
                }
                self.eat(TokenKind::RBrace, "}")?;
                ExprKind::List(elems)
            }
            _ => bail!("{}: unexpected '{}' here", tok.ini, tok.text),
        };
        Ok(Expr {
            kind,
            span: self.span_from(tok.ini),
        })
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
