//! S-expression reader
//!
//! Stands in for the out-of-scope generated parser: a hand-written
//! tokenizer and recursive-descent reader that turns source text into a
//! concrete parse tree of the same shape the transformer (`transformer`
//! module) expects. It knows nothing about `define`/`if`/`lambda` —
//! those are recognized later, by the transformer, exactly as the
//! grammar routes them through a generic `procedure_call` production.

use crate::error::{CompileError, Result};

/// A numeric literal as read from source, before the transformer widens
/// everything to `f64` for codegen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumLit {
    Int(i64),
    Real(f64),
}

impl NumLit {
    pub fn as_f64(self) -> f64 {
        match self {
            NumLit::Int(n) => n as f64,
            NumLit::Real(r) => r,
        }
    }
}

/// Concrete parse tree node, pre-transformation.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseTree {
    List(Vec<ParseTree>),
    Symbol(String),
    Number(NumLit),
    Str(String),
    Bool(bool),
}

/// Tokenize source into a flat token stream, preserving string literals
/// (including their quotes) as single tokens and parens as their own
/// tokens. Comments (`;` to end of line) are dropped.
fn tokenize(source: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_string = false;
    let mut in_comment = false;
    let mut chars = source.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_comment {
            if ch == '\n' {
                in_comment = false;
            }
            continue;
        }
        if in_string {
            current.push(ch);
            if ch == '"' {
                in_string = false;
                tokens.push(current.clone());
                current.clear();
            }
            continue;
        }
        match ch {
            '"' => {
                if !current.is_empty() {
                    tokens.push(current.clone());
                    current.clear();
                }
                in_string = true;
                current.push(ch);
            }
            ';' => {
                if !current.is_empty() {
                    tokens.push(current.clone());
                    current.clear();
                }
                in_comment = true;
            }
            '(' | ')' => {
                if !current.is_empty() {
                    tokens.push(current.clone());
                    current.clear();
                }
                tokens.push(ch.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(current.clone());
                    current.clear();
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

struct Reader {
    tokens: Vec<String>,
    pos: usize,
}

impl Reader {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn advance(&mut self) -> Option<String> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn read_form(&mut self) -> Result<ParseTree> {
        match self.peek() {
            None => Err(CompileError::Parse("unexpected end of input".to_string())),
            Some("(") => {
                self.advance();
                let mut elements = Vec::new();
                loop {
                    match self.peek() {
                        None => {
                            return Err(CompileError::Parse(
                                "unterminated list: missing ')'".to_string(),
                            ));
                        }
                        Some(")") => {
                            self.advance();
                            break;
                        }
                        _ => elements.push(self.read_form()?),
                    }
                }
                Ok(ParseTree::List(elements))
            }
            Some(")") => Err(CompileError::Parse("unexpected ')'".to_string())),
            Some(_) => {
                let tok = self.advance().expect("peek already confirmed a token");
                Ok(atom(&tok))
            }
        }
    }
}

/// Classify a single non-paren token into a leaf `ParseTree`.
fn atom(tok: &str) -> ParseTree {
    if tok == "#t" {
        return ParseTree::Bool(true);
    }
    if tok == "#f" {
        return ParseTree::Bool(false);
    }
    if tok.starts_with('"') && tok.ends_with('"') && tok.len() >= 2 {
        return ParseTree::Str(tok[1..tok.len() - 1].to_string());
    }
    if let Ok(n) = tok.parse::<i64>() {
        return ParseTree::Number(NumLit::Int(n));
    }
    if tok.contains('.') {
        if let Ok(f) = tok.parse::<f64>() {
            return ParseTree::Number(NumLit::Real(f));
        }
    }
    ParseTree::Symbol(tok.to_string())
}

/// Read every top-level form in `source`, in source order.
pub fn read_program(source: &str) -> Result<Vec<ParseTree>> {
    let mut reader = Reader {
        tokens: tokenize(source),
        pos: 0,
    };
    let mut forms = Vec::new();
    while reader.peek().is_some() {
        forms.push(reader.read_form()?);
    }
    Ok(forms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_atoms() {
        assert_eq!(atom("42"), ParseTree::Number(NumLit::Int(42)));
        assert_eq!(atom("3.14"), ParseTree::Number(NumLit::Real(3.14)));
        assert_eq!(atom("#t"), ParseTree::Bool(true));
        assert_eq!(atom("#f"), ParseTree::Bool(false));
        assert_eq!(atom("x"), ParseTree::Symbol("x".to_string()));
        assert_eq!(atom("+"), ParseTree::Symbol("+".to_string()));
    }

    #[test]
    fn reads_nested_list() {
        let forms = read_program("(define (square x) (* x x))").unwrap();
        assert_eq!(forms.len(), 1);
        match &forms[0] {
            ParseTree::List(elements) => assert_eq!(elements.len(), 3),
            other => panic!("expected a list, got {other:?}"),
        }
    }

    #[test]
    fn strips_comments() {
        let forms = read_program(";; Result: 36\n(+ 1 2)").unwrap();
        assert_eq!(forms.len(), 1);
    }

    #[test]
    fn reads_multiple_top_level_forms() {
        let forms =
            read_program("(define (square x) (* x x)) (square 6)").unwrap();
        assert_eq!(forms.len(), 2);
    }

    #[test]
    fn unterminated_list_is_an_error() {
        assert!(read_program("(+ 1 2").is_err());
    }

    #[test]
    fn reads_string_literal() {
        assert_eq!(atom("\"hi\""), ParseTree::Str("hi".to_string()));
    }
}
