use anyhow::{anyhow, Result};
use logos::Logos;

use crate::ast::Pos;

#[derive(Logos, Debug, PartialEq, Eq, Clone, Copy)]
pub enum TokenKind {
    #[regex(r"[ \t\r\n\f]+", logos::skip)]
    Whitespace,
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", logos::skip)]
    BlockComment,

    // `#include <iostream>` and friends, kept whole
    #[regex(r"#[^\n]*")]
    Directive,

    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("return")]
    Return,
    #[token("struct")]
    Struct,
    #[token("const")]
    Const,
    #[token("using")]
    Using,
    #[token("namespace")]
    Namespace,
    #[token("break")]
    Break,
    #[token("continue")]
    Continue,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    String,
    #[regex(r"'([^'\\\n]|\\.)'")]
    Char,
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?f")]
    Float,
    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?")]
    Double,
    #[regex(r"[0-9]+")]
    Int,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,

    #[token("++")]
    PlusPlus,
    #[token("--")]
    MinusMinus,
    #[token("+=")]
    PlusEqual,
    #[token("-=")]
    MinusEqual,
    #[token("*=")]
    StarEqual,
    #[token("/=")]
    SlashEqual,
    #[token("%=")]
    PercentEqual,
    #[token("&=")]
    AmpEqual,
    #[token("|=")]
    PipeEqual,
    #[token("^=")]
    CaretEqual,
    #[token("==")]
    EqualEqual,
    #[token("!=")]
    BangEqual,
    #[token("<=")]
    LessEqual,
    #[token(">=")]
    GreaterEqual,
    #[token("<<")]
    LessLess,
    #[token(">>")]
    GreaterGreater,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    PipePipe,
    #[token("&")]
    Amp,
    #[token("|")]
    Pipe,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("=")]
    Equal,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[error]
    Error,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub ini: Pos,
    pub fin: Pos,
}

pub fn lex(input: &str) -> Result<Vec<Token>> {
    let mut lex = TokenKind::lexer(input);
    // Precompute line starts for line/col mapping
    let mut line_starts: Vec<usize> = vec![0];
    for (i, ch) in input.char_indices() {
        if ch == '\n' {
            line_starts.push(i + 1);
        }
    }
    let find_pos = |offset: usize| -> Pos {
        // greatest line start <= offset
        let idx = match line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        let col = input[line_starts[idx]..offset].chars().count() + 1;
        Pos {
            line: idx + 1,
            col,
            offset,
        }
    };
    let mut tokens = Vec::new();
    while let Some(kind) = lex.next() {
        let text = lex.slice().to_string();
        let span = lex.span();
        let ini = find_pos(span.start);
        if matches!(kind, TokenKind::Error) {
            return Err(anyhow!("{}: unexpected character '{}'", ini, text));
        }
        tokens.push(Token {
            kind,
            text,
            ini,
            fin: find_pos(span.end),
        });
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn skips_comments_and_keeps_directives() {
        let k = kinds("#include <iostream>\n// hi\nint /* x */ a;");
        assert_eq!(
            k,
            vec![
                TokenKind::Directive,
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Semi
            ]
        );
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(
            kinds("1 2.5 2.5f"),
            vec![TokenKind::Int, TokenKind::Double, TokenKind::Float]
        );
    }

    #[test]
    fn positions_are_one_based() {
        let toks = lex("int x;\n  x = 1;").unwrap();
        let x2 = &toks[3];
        assert_eq!(x2.text, "x");
        assert_eq!((x2.ini.line, x2.ini.col), (2, 3));
        assert_eq!(x2.fin.col, 4);
    }

    #[test]
    fn stream_operators() {
        assert_eq!(
            kinds("cout << a >> b"),
            vec![
                TokenKind::Ident,
                TokenKind::LessLess,
                TokenKind::Ident,
                TokenKind::GreaterGreater,
                TokenKind::Ident
            ]
        );
    }

    #[test]
    fn rejects_unknown_characters() {
        let err = lex("int a = @;").unwrap_err();
        assert!(err.to_string().contains("1,9"), "{}", err);
    }
}
