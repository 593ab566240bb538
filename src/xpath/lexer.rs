//! `XPath` 1.0 tokenizer.
//!
//! The disambiguation rules of `XPath` 1.0 §3.7 are applied while scanning,
//! using the previously emitted token:
//!
//! - After a token that can end an operand, `*` is the multiply operator and
//!   `and`, `or`, `mod`, `div` are operator names.
//! - A name followed by `(` is a function name or a node type.
//! - A name followed by `::` is an axis name.
//! - Any other name is a name test.

use crate::parser::input::{is_name_char, is_name_start_char};

use super::ast::{Axis, BinaryOp};
use super::types::XPathError;

/// A token with its byte offset in the expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

/// An `XPath` token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    Dot,
    DotDot,
    At,
    Comma,
    ColonColon,
    Slash,
    DoubleSlash,
    Pipe,
    Minus,
    /// Any binary operator other than `-`.
    Operator(BinaryOp),
    Number(f64),
    Literal(String),
    Variable(String),
    /// `*`, `prefix:*`, `name` or `prefix:name` in name-test position.
    NameTest {
        prefix: Option<String>,
        local: String,
    },
    FunctionName(String),
    NodeType(String),
    AxisName(Axis),
}

impl Token {
    /// True if the token can end an operand, which turns a following `*` or
    /// operator name into an operator.
    fn ends_operand(&self) -> bool {
        matches!(
            self,
            Self::RightParen
                | Self::RightBracket
                | Self::Dot
                | Self::DotDot
                | Self::Number(_)
                | Self::Literal(_)
                | Self::Variable(_)
                | Self::NameTest { .. }
        )
    }
}

/// Tokenizes an expression.
///
/// # Errors
///
/// Returns [`XPathError::Syntax`] on an unterminated literal, an unknown
/// axis, or a character that cannot start a token.
pub fn tokenize(input: &str) -> Result<Vec<Spanned>, XPathError> {
    let mut lexer = Lexer {
        input,
        pos: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    tokens: Vec<Spanned>,
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<(), XPathError> {
        loop {
            self.skip_whitespace();
            let Some(c) = self.peek() else {
                return Ok(());
            };
            let offset = self.pos;
            let token = match c {
                '(' => self.single(Token::LeftParen),
                ')' => self.single(Token::RightParen),
                '[' => self.single(Token::LeftBracket),
                ']' => self.single(Token::RightBracket),
                '@' => self.single(Token::At),
                ',' => self.single(Token::Comma),
                '|' => self.single(Token::Pipe),
                '-' => self.single(Token::Minus),
                '+' => self.single(Token::Operator(BinaryOp::Add)),
                '=' => self.single(Token::Operator(BinaryOp::Eq)),
                '/' => self.one_or_two('/', Token::Slash, Token::DoubleSlash),
                '<' => self.one_or_two(
                    '=',
                    Token::Operator(BinaryOp::Lt),
                    Token::Operator(BinaryOp::Lte),
                ),
                '>' => self.one_or_two(
                    '=',
                    Token::Operator(BinaryOp::Gt),
                    Token::Operator(BinaryOp::Gte),
                ),
                '!' => {
                    if self.rest().starts_with("!=") {
                        self.pos += 2;
                        Token::Operator(BinaryOp::Neq)
                    } else {
                        return Err(self.error(offset, "expected '=' after '!'"));
                    }
                }
                ':' => {
                    if self.rest().starts_with("::") {
                        self.pos += 2;
                        Token::ColonColon
                    } else {
                        return Err(self.error(offset, "unexpected ':'"));
                    }
                }
                '*' => {
                    self.pos += 1;
                    if self.after_operand() {
                        Token::Operator(BinaryOp::Mul)
                    } else {
                        Token::NameTest {
                            prefix: None,
                            local: "*".to_owned(),
                        }
                    }
                }
                '.' => self.dot_or_number()?,
                '"' | '\'' => self.literal(c)?,
                '$' => {
                    self.pos += 1;
                    match self.qname() {
                        Some((prefix, local)) => Token::Variable(join(prefix, local)),
                        None => return Err(self.error(offset, "expected a name after '$'")),
                    }
                }
                '0'..='9' => self.number()?,
                c if is_name_start_char(c) => self.name(offset)?,
                other => {
                    return Err(self.error(offset, &format!("unexpected character '{other}'")))
                }
            };
            self.tokens.push(Spanned { token, offset });
        }
    }

    fn rest(&self) -> &'a str {
        let input = self.input;
        &input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start_matches([' ', '\t', '\r', '\n']).len();
    }

    fn after_operand(&self) -> bool {
        self.tokens.last().is_some_and(|t| t.token.ends_operand())
    }

    fn single(&mut self, token: Token) -> Token {
        self.pos += 1;
        token
    }

    fn one_or_two(&mut self, second: char, one: Token, two: Token) -> Token {
        self.pos += 1;
        if self.peek() == Some(second) {
            self.pos += 1;
            two
        } else {
            one
        }
    }

    fn dot_or_number(&mut self) -> Result<Token, XPathError> {
        if self.rest().starts_with("..") {
            self.pos += 2;
            return Ok(Token::DotDot);
        }
        if self.rest()[1..].starts_with(|c: char| c.is_ascii_digit()) {
            return self.number();
        }
        self.pos += 1;
        Ok(Token::Dot)
    }

    fn number(&mut self) -> Result<Token, XPathError> {
        let start = self.pos;
        let digits = |s: &str| s.len() - s.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        self.pos += digits(self.rest());
        if self.peek() == Some('.') {
            self.pos += 1;
            self.pos += digits(self.rest());
        }
        let text = &self.input[start..self.pos];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error(start, &format!("invalid number '{text}'")))
    }

    fn literal(&mut self, quote: char) -> Result<Token, XPathError> {
        let start = self.pos;
        let body = &self.input[start + 1..];
        match body.find(quote) {
            Some(end) => {
                self.pos = start + 1 + end + 1;
                Ok(Token::Literal(body[..end].to_owned()))
            }
            None => Err(self.error(start, "unterminated string literal")),
        }
    }

    fn ncname(&mut self) -> Option<&'a str> {
        let rest = self.rest();
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if c != ':' && is_name_start_char(c) => {}
            _ => return None,
        }
        let end = chars
            .find(|&(_, c)| c == ':' || !is_name_char(c))
            .map_or(rest.len(), |(i, _)| i);
        self.pos += end;
        Some(&rest[..end])
    }

    /// Reads `name` or `prefix:name`. A `prefix:*` yields a local part of
    /// `"*"`.
    fn qname(&mut self) -> Option<(Option<String>, String)> {
        let first = self.ncname()?.to_owned();
        let rest = self.rest();
        if rest.starts_with(':') && !rest.starts_with("::") {
            let saved = self.pos;
            self.pos += 1;
            if self.peek() == Some('*') {
                self.pos += 1;
                return Some((Some(first), "*".to_owned()));
            }
            if let Some(local) = self.ncname() {
                return Some((Some(first), local.to_owned()));
            }
            self.pos = saved;
        }
        Some((None, first))
    }

    fn name(&mut self, offset: usize) -> Result<Token, XPathError> {
        let Some((prefix, local)) = self.qname() else {
            return Err(self.error(offset, "expected a name"));
        };

        if prefix.is_none() && self.after_operand() {
            let op = match local.as_str() {
                "and" => Some(BinaryOp::And),
                "or" => Some(BinaryOp::Or),
                "mod" => Some(BinaryOp::Mod),
                "div" => Some(BinaryOp::Div),
                _ => None,
            };
            if let Some(op) = op {
                return Ok(Token::Operator(op));
            }
        }

        let saved = self.pos;
        self.skip_whitespace();
        let next = self.rest();
        if next.starts_with('(') && local != "*" {
            self.pos = saved;
            if prefix.is_none()
                && matches!(
                    local.as_str(),
                    "comment" | "text" | "processing-instruction" | "node"
                )
            {
                return Ok(Token::NodeType(local));
            }
            return Ok(Token::FunctionName(join(prefix, local)));
        }
        if next.starts_with("::") && prefix.is_none() {
            self.pos = saved;
            return Axis::from_name(&local)
                .map(Token::AxisName)
                .ok_or_else(|| self.error(offset, &format!("unknown axis '{local}'")));
        }
        self.pos = saved;
        Ok(Token::NameTest { prefix, local })
    }

    fn error(&self, position: usize, message: &str) -> XPathError {
        XPathError::Syntax {
            message: message.to_owned(),
            position,
        }
    }
}

fn join(prefix: Option<String>, local: String) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local,
    }
}
