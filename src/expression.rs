//! Boolean expression engine used by composites.
//!
//! Composites only need two things from an expression: that it compiles and
//! that its atoms can be enumerated afterwards. Anything that can do that
//! plugs in through [`ExpressionEngine`].

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("empty expression")]
    Empty,
    #[error("unexpected token '{token}' at offset {offset}")]
    UnexpectedToken { token: String, offset: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unbalanced parenthesis at offset {offset}")]
    UnbalancedParenthesis { offset: usize },
    #[error("expression nested too deeply at offset {offset}")]
    TooDeep { offset: usize },
    #[error("{0}")]
    Other(String),
}

/// A compiled expression handle.
pub trait Expression: Send + Sync {
    /// Calls `visitor` once per token in document order, operators and
    /// parentheses included.
    fn for_each_atom(&self, visitor: &mut dyn FnMut(&str));
}

pub trait ExpressionEngine {
    fn compile(&self, text: &str) -> Result<Box<dyn Expression>, ExpressionError>;
}

/// True for tokens that are operators or punctuation rather than names.
pub fn is_operator_atom(atom: &str) -> bool {
    match atom.as_bytes().first() {
        None => true,
        Some(c) => matches!(c, b'&' | b'|' | b'!' | b'(' | b')'),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    And,
    Or,
    Not,
    Open,
    Close,
    Atom,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    text: String,
    offset: usize,
}

#[derive(Debug)]
struct CompiledExpression {
    tokens: Vec<Token>,
}

impl Expression for CompiledExpression {
    fn for_each_atom(&self, visitor: &mut dyn FnMut(&str)) {
        for token in &self.tokens {
            visitor(&token.text);
        }
    }
}

/// Production engine for `&`, `|`, `!` and parentheses over symbol names.
///
/// `&&` and `||` are accepted as spellings of `&` and `|`. Atoms are kept
/// verbatim and are not resolved at compile time.
pub struct BooleanEngine {
    token_pattern: Regex,
}

impl BooleanEngine {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            token_pattern: Regex::new(r"&&?|\|\|?|!|\(|\)|[^\s&|!()]+")?,
        })
    }

    fn tokenize(&self, text: &str) -> Vec<Token> {
        self.token_pattern
            .find_iter(text)
            .map(|m| {
                let kind = match m.as_str() {
                    "&" | "&&" => TokenKind::And,
                    "|" | "||" => TokenKind::Or,
                    "!" => TokenKind::Not,
                    "(" => TokenKind::Open,
                    ")" => TokenKind::Close,
                    _ => TokenKind::Atom,
                };
                Token {
                    kind,
                    text: m.as_str().to_string(),
                    offset: m.start(),
                }
            })
            .collect()
    }
}

impl ExpressionEngine for BooleanEngine {
    fn compile(&self, text: &str) -> Result<Box<dyn Expression>, ExpressionError> {
        let tokens = self.tokenize(text);
        if tokens.is_empty() {
            return Err(ExpressionError::Empty);
        }

        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
        };
        parser.expr()?;

        if let Some(token) = parser.peek() {
            return Err(match token.kind {
                TokenKind::Close => ExpressionError::UnbalancedParenthesis {
                    offset: token.offset,
                },
                _ => ExpressionError::UnexpectedToken {
                    token: token.text.clone(),
                    offset: token.offset,
                },
            });
        }

        Ok(Box::new(CompiledExpression { tokens }))
    }
}

/// Maximum parenthesis nesting accepted by [`BooleanEngine`].
pub const MAX_DEPTH: usize = 256;

/// Syntax check only, nothing is built besides the token list.
struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expr(&mut self) -> Result<(), ExpressionError> {
        self.unary()?;
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::And | TokenKind::Or => {
                    self.pos += 1;
                    self.unary()?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn unary(&mut self) -> Result<(), ExpressionError> {
        // Negations chain without recursing.
        let mut token = self.advance().ok_or(ExpressionError::UnexpectedEnd)?;
        while token.kind == TokenKind::Not {
            token = self.advance().ok_or(ExpressionError::UnexpectedEnd)?;
        }

        match token.kind {
            TokenKind::Atom => Ok(()),
            TokenKind::Open => {
                if self.depth >= MAX_DEPTH {
                    return Err(ExpressionError::TooDeep {
                        offset: token.offset,
                    });
                }
                self.depth += 1;
                self.expr()?;
                self.depth -= 1;
                match self.advance() {
                    Some(close) if close.kind == TokenKind::Close => Ok(()),
                    Some(other) => Err(ExpressionError::UnexpectedToken {
                        token: other.text.clone(),
                        offset: other.offset,
                    }),
                    None => Err(ExpressionError::UnbalancedParenthesis {
                        offset: token.offset,
                    }),
                }
            }
            TokenKind::Not | TokenKind::And | TokenKind::Or | TokenKind::Close => {
                Err(ExpressionError::UnexpectedToken {
                    token: token.text.clone(),
                    offset: token.offset,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atoms(engine: &BooleanEngine, text: &str) -> Vec<String> {
        let expr = engine.compile(text).unwrap();
        let mut out = Vec::new();
        expr.for_each_atom(&mut |atom| out.push(atom.to_string()));
        out
    }

    #[test]
    fn test_atoms_in_document_order() {
        let engine = BooleanEngine::new().unwrap();
        assert_eq!(
            atoms(&engine, "HEADER_MISSING & !WHITELISTED"),
            vec!["HEADER_MISSING", "&", "!", "WHITELISTED"]
        );
        assert_eq!(
            atoms(&engine, "(A||B)&&!(C)"),
            vec!["(", "A", "||", "B", ")", "&&", "!", "(", "C", ")"]
        );
    }

    #[test]
    fn test_single_atom() {
        let engine = BooleanEngine::new().unwrap();
        assert_eq!(atoms(&engine, "  R_SPF_ALLOW "), vec!["R_SPF_ALLOW"]);
    }

    #[test]
    fn test_compile_errors() {
        let engine = BooleanEngine::new().unwrap();

        assert_eq!(engine.compile("").err(), Some(ExpressionError::Empty));
        assert_eq!(engine.compile("   ").err(), Some(ExpressionError::Empty));
        assert_eq!(
            engine.compile("A &").err(),
            Some(ExpressionError::UnexpectedEnd)
        );
        assert_eq!(
            engine.compile("(A | B").err(),
            Some(ExpressionError::UnbalancedParenthesis { offset: 0 })
        );
        assert_eq!(
            engine.compile("A | B)").err(),
            Some(ExpressionError::UnbalancedParenthesis { offset: 5 })
        );
        assert_eq!(
            engine.compile("A B").err(),
            Some(ExpressionError::UnexpectedToken {
                token: "B".to_string(),
                offset: 2
            })
        );
        assert!(matches!(
            engine.compile("& A"),
            Err(ExpressionError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn test_nesting_limit() {
        let engine = BooleanEngine::new().unwrap();

        let nots = format!("{}A", "!".repeat(100_000));
        assert!(engine.compile(&nots).is_ok());

        let ok = format!("{}A{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(engine.compile(&ok).is_ok());

        let deep = format!("{}A{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(
            engine.compile(&deep).err(),
            Some(ExpressionError::TooDeep { offset: MAX_DEPTH })
        );
    }

    #[test]
    fn test_operator_atoms() {
        for op in ["&", "&&", "|", "||", "!", "(", ")", ""] {
            assert!(is_operator_atom(op), "{op:?} should be an operator");
        }
        assert!(!is_operator_atom("BAYES_SPAM"));
        assert!(!is_operator_atom("~SYMBOL"));
    }
}
