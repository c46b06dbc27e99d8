//! Parser and evaluator for live scripts.
//!
//! A script is line-oriented:
//!
//! ```text
//! // comments and blank lines are skipped
//! let label = "Count: {count}"
//! text(label)
//! button("+1", increment)
//! ```

use std::fmt;

use chumsky::prelude::*;
use logos::Logos;
use thiserror::Error;

use crate::grammar::describe;

use super::scope::{Action, Scope, Store, Value};

/// A fault raised while parsing or evaluating a script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("line {line}: syntax error: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: unknown identifier '{name}'")]
    UnknownIdentifier { line: usize, name: String },

    #[error("line {line}: {message}")]
    Type { line: usize, message: String },
}

impl EvalError {
    /// 1-based line the fault was raised on.
    pub fn line(&self) -> usize {
        match self {
            EvalError::Syntax { line, .. }
            | EvalError::UnknownIdentifier { line, .. }
            | EvalError::Type { line, .. } => *line,
        }
    }

    fn syntax(line: usize, message: impl Into<String>) -> Self {
        EvalError::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// One rendered element of a live preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    Text(String),
    Button { label: String, action: Action },
}

/// Ordered output of a script.
pub type View = Vec<Element>;

#[derive(Logos, Debug, Clone, PartialEq, Eq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"//[^\n]*")]
enum Token {
    #[token("let")]
    Let,
    #[token("text")]
    Text,
    #[token("button")]
    Button,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
    #[token("=")]
    Eq,
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    Str(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Let => write!(f, "let"),
            Token::Text => write!(f, "text"),
            Token::Button => write!(f, "button"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Eq => write!(f, "="),
            Token::Int(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Ident(name) => write!(f, "{}", name),
        }
    }
}

/// Strip the quotes of a string literal and resolve its escapes.
fn unescape(literal: &str) -> String {
    let body = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some(escaped) => out.push(escaped),
                None => {}
            },
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    /// String literal; `{name}` segments are interpolated at evaluation.
    Str(String),
    Int(i64),
    Ident(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stmt {
    Let { name: String, value: Expr },
    Text(Expr),
    Button { label: Expr, action: Expr },
}

/// A parsed script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    statements: Vec<(usize, Stmt)>,
}

impl Script {
    /// Parse script source.
    pub fn parse(source: &str) -> Result<Self, EvalError> {
        let mut statements = Vec::new();
        for (index, text) in source.lines().enumerate() {
            let line = index + 1;
            let tokens = tokenize(text, line)?;
            if tokens.is_empty() {
                continue;
            }
            let stmt = statement()
                .parse(tokens.as_slice())
                .into_result()
                .map_err(|errors| EvalError::syntax(line, describe(&errors, "end of line")))?;
            statements.push((line, stmt));
        }
        Ok(Self { statements })
    }

    /// Evaluate against `store`, producing the view.
    pub fn evaluate(&self, store: &Store) -> Result<View, EvalError> {
        let mut scope = Scope::new(store);
        let mut view = View::new();

        for (line, stmt) in &self.statements {
            let line = *line;
            match stmt {
                Stmt::Let { name, value } => {
                    let value = eval_expr(value, &scope, line)?;
                    scope.define(name.clone(), value);
                }
                Stmt::Text(expr) => {
                    let value = eval_expr(expr, &scope, line)?;
                    view.push(Element::Text(display(&value, "text", line)?));
                }
                Stmt::Button { label, action } => {
                    let label = display(&eval_expr(label, &scope, line)?, "button", line)?;
                    let action = match eval_expr(action, &scope, line)? {
                        Value::Action(action) => action,
                        other => {
                            return Err(EvalError::Type {
                                line,
                                message: format!("button expects an action, found {}", other.kind()),
                            });
                        }
                    };
                    view.push(Element::Button { label, action });
                }
            }
        }

        Ok(view)
    }
}

/// Parse and evaluate in one step.
pub fn evaluate(source: &str, store: &Store) -> Result<View, EvalError> {
    Script::parse(source)?.evaluate(store)
}

fn display(value: &Value, callee: &str, line: usize) -> Result<String, EvalError> {
    value.as_text().ok_or_else(|| EvalError::Type {
        line,
        message: format!("{} expects a string or integer, found {}", callee, value.kind()),
    })
}

fn eval_expr(expr: &Expr, scope: &Scope<'_>, line: usize) -> Result<Value, EvalError> {
    match expr {
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Ident(name) => lookup(scope, name, line),
        Expr::Str(template) => interpolate(template, scope, line).map(Value::Str),
    }
}

fn lookup(scope: &Scope<'_>, name: &str, line: usize) -> Result<Value, EvalError> {
    scope.lookup(name).ok_or_else(|| EvalError::UnknownIdentifier {
        line,
        name: name.to_string(),
    })
}

/// A piece of a string template.
enum Segment<'src> {
    Literal(&'src str),
    Hole(&'src str),
}

/// `{name}` holes inside a string literal.
fn template<'src>() -> impl Parser<'src, &'src str, Vec<Segment<'src>>, extra::Err<Rich<'src, char>>> {
    let literal = none_of("{")
        .repeated()
        .at_least(1)
        .to_slice()
        .map(Segment::Literal);
    let hole = text::ascii::ident()
        .padded()
        .delimited_by(just('{'), just('}'))
        .map(Segment::Hole);

    choice((literal, hole))
        .repeated()
        .collect::<Vec<_>>()
        .then_ignore(end())
}

fn interpolate(source: &str, scope: &Scope<'_>, line: usize) -> Result<String, EvalError> {
    let segments = template().parse(source).into_result().map_err(|errors| {
        EvalError::syntax(
            line,
            format!("invalid interpolation: {}", describe(&errors, "end of string")),
        )
    })?;

    let mut out = String::with_capacity(source.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Hole(name) => {
                let value = lookup(scope, name, line)?;
                out.push_str(&display(&value, "interpolation", line)?);
            }
        }
    }
    Ok(out)
}

fn tokenize(text: &str, line: usize) -> Result<Vec<Token>, EvalError> {
    let mut lexer = Token::lexer(text);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        match result {
            Ok(token) => tokens.push(token),
            Err(()) if lexer.slice().starts_with('"') => {
                return Err(EvalError::syntax(line, "unterminated string"));
            }
            Err(()) => {
                return Err(EvalError::syntax(
                    line,
                    format!("unexpected '{}'", lexer.slice()),
                ));
            }
        }
    }

    Ok(tokens)
}

/// One statement per line: `let`, `text(..)` or `button(.., ..)`.
fn statement<'src>() -> impl Parser<'src, &'src [Token], Stmt, extra::Err<Rich<'src, Token>>> {
    let expr = select! {
        Token::Str(s) => Expr::Str(s),
        Token::Int(n) => Expr::Int(n),
        Token::Ident(name) => Expr::Ident(name),
    }
    .labelled("expression");
    let name = select! { Token::Ident(name) => name }.labelled("name");

    let let_stmt = just(Token::Let)
        .ignore_then(name)
        .then_ignore(just(Token::Eq))
        .then(expr.clone())
        .map(|(name, value)| Stmt::Let { name, value });

    let text_stmt = just(Token::Text)
        .ignore_then(expr.clone().delimited_by(just(Token::LParen), just(Token::RParen)))
        .map(Stmt::Text);

    let button = just(Token::Button)
        .ignore_then(
            expr.clone()
                .then_ignore(just(Token::Comma))
                .then(expr)
                .delimited_by(just(Token::LParen), just(Token::RParen)),
        )
        .map(|(label, action)| Stmt::Button { label, action });

    choice((let_stmt, text_stmt, button))
        .labelled("statement")
        .then_ignore(end())
}
