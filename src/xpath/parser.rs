//! Recursive descent parser for `XPath` 1.0.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! Expr           ::= OrExpr
//! OrExpr         ::= AndExpr ('or' AndExpr)*
//! AndExpr        ::= EqualityExpr ('and' EqualityExpr)*
//! EqualityExpr   ::= RelationalExpr (('=' | '!=') RelationalExpr)*
//! RelationalExpr ::= AdditiveExpr (('<' | '<=' | '>' | '>=') AdditiveExpr)*
//! AdditiveExpr   ::= MultiplicativeExpr (('+' | '-') MultiplicativeExpr)*
//! MultiplicativeExpr ::= UnaryExpr (('*' | 'div' | 'mod') UnaryExpr)*
//! UnaryExpr      ::= '-'* UnionExpr
//! UnionExpr      ::= PathExpr ('|' PathExpr)*
//! PathExpr       ::= LocationPath | FilterExpr (('/' | '//') RelativeLocationPath)?
//! ```
//!
//! Nesting (parentheses, predicates, function arguments, negations and
//! operator chains) deeper than [`MAX_EXPR_DEPTH`] is a syntax error.

use std::fmt;

use super::ast::{Axis, BinaryOp, Expr, LocationPath, NodeTest, PathStart, Step};
use super::lexer::{tokenize, Spanned, Token};
use super::types::XPathError;

/// Maximum nesting depth of a compiled expression.
pub const MAX_EXPR_DEPTH: usize = 128;

/// A compiled expression, ready to be evaluated any number of times.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledExpr {
    source: String,
    expr: Expr,
}

impl CompiledExpr {
    /// The expression text this was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The syntax tree.
    #[must_use]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl fmt::Display for CompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Compiles an expression.
///
/// Function names and argument counts are checked here, so evaluation never
/// sees an unknown function.
///
/// # Errors
///
/// Returns [`XPathError::Syntax`], [`XPathError::UndefinedFunction`] or
/// [`XPathError::InvalidArgCount`].
///
/// # Examples
///
/// ```
/// use xmlward::xpath::compile;
///
/// let expr = compile("/root/child[@id='a']").unwrap();
/// assert_eq!(expr.source(), "/root/child[@id='a']");
/// assert!(compile("/root/").is_err());
/// ```
pub fn compile(input: &str) -> Result<CompiledExpr, XPathError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
        depth: 0,
    };
    let expr = parser.parse_expr()?;
    if let Some(extra) = parser.peek() {
        let extra = format!("unexpected token {extra:?}");
        return Err(parser.error(&extra));
    }
    Ok(CompiledExpr {
        source: input.to_owned(),
        expr,
    })
}

/// Arity of each core library function: `(min, max)`, `None` for variadic.
fn arity(name: &str) -> Option<(usize, Option<usize>)> {
    Some(match name {
        "last" | "position" | "true" | "false" => (0, Some(0)),
        "count" | "id" | "boolean" | "not" | "lang" | "sum" | "floor" | "ceiling"
        | "round" => (1, Some(1)),
        "local-name" | "namespace-uri" | "name" | "string" | "string-length"
        | "normalize-space" | "number" => (0, Some(1)),
        "starts-with" | "contains" | "substring-before" | "substring-after" => (2, Some(2)),
        "substring" => (2, Some(3)),
        "translate" => (3, Some(3)),
        "concat" => (2, None),
        _ => return None,
    })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn check(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), XPathError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: &str) -> XPathError {
        XPathError::Syntax {
            message: message.to_owned(),
            position: self.tokens.get(self.pos).map_or(self.end, |s| s.offset),
        }
    }

    // -- Depth tracking --

    /// Increments the nesting depth. Exceeding [`MAX_EXPR_DEPTH`] is an error.
    fn increment_depth(&mut self) -> Result<(), XPathError> {
        self.depth += 1;
        if self.depth > MAX_EXPR_DEPTH {
            return Err(self.error(&format!(
                "maximum expression nesting depth exceeded ({MAX_EXPR_DEPTH})"
            )));
        }
        Ok(())
    }

    fn peek_operator(&self, ops: &[BinaryOp]) -> Option<BinaryOp> {
        match self.peek() {
            Some(Token::Operator(op)) if ops.contains(op) => Some(*op),
            Some(Token::Minus) if ops.contains(&BinaryOp::Sub) => Some(BinaryOp::Sub),
            _ => None,
        }
    }

    /// Parses one left-associative precedence level.
    fn binary_level(
        &mut self,
        ops: &[BinaryOp],
        operand: fn(&mut Self) -> Result<Expr, XPathError>,
    ) -> Result<Expr, XPathError> {
        let mut left = operand(self)?;
        let outer = self.depth;
        while let Some(op) = self.peek_operator(ops) {
            self.pos += 1;
            // Each operator nests the chain built so far one level deeper.
            self.increment_depth()?;
            let right = operand(self)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = outer;
        Ok(left)
    }

    fn parse_expr(&mut self) -> Result<Expr, XPathError> {
        self.increment_depth()?;
        let expr = self.binary_level(&[BinaryOp::Or], Self::parse_and)?;
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(&[BinaryOp::And], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(&[BinaryOp::Eq, BinaryOp::Neq], Self::parse_relational)
    }

    fn parse_relational(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(
            &[BinaryOp::Lt, BinaryOp::Lte, BinaryOp::Gt, BinaryOp::Gte],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(&[BinaryOp::Add, BinaryOp::Sub], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(
            &[BinaryOp::Mul, BinaryOp::Div, BinaryOp::Mod],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, XPathError> {
        let outer = self.depth;
        let mut negations = 0;
        while self.eat(&Token::Minus) {
            self.increment_depth()?;
            negations += 1;
        }
        let mut expr = self.parse_union()?;
        for _ in 0..negations {
            expr = Expr::Negate(Box::new(expr));
        }
        self.depth = outer;
        Ok(expr)
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_path()?;
        let outer = self.depth;
        while self.eat(&Token::Pipe) {
            self.increment_depth()?;
            let right = self.parse_path()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        self.depth = outer;
        Ok(left)
    }

    fn parse_path(&mut self) -> Result<Expr, XPathError> {
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                let mut steps = Vec::new();
                if self.at_step_start() {
                    self.parse_relative_path(&mut steps)?;
                }
                Ok(Expr::Path(LocationPath {
                    start: PathStart::Root,
                    steps,
                }))
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                let mut steps = vec![Step::descendant_or_self()];
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path(LocationPath {
                    start: PathStart::Root,
                    steps,
                }))
            }
            Some(
                Token::Variable(_)
                | Token::Literal(_)
                | Token::Number(_)
                | Token::LeftParen
                | Token::FunctionName(_),
            ) => self.parse_filter_path(),
            _ if self.at_step_start() => {
                let mut steps = Vec::new();
                self.parse_relative_path(&mut steps)?;
                Ok(Expr::Path(LocationPath {
                    start: PathStart::Context,
                    steps,
                }))
            }
            _ => Err(self.error("expected an expression")),
        }
    }

    /// `FilterExpr`, optionally continued by a relative path.
    fn parse_filter_path(&mut self) -> Result<Expr, XPathError> {
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        let filter = if predicates.is_empty() {
            primary
        } else {
            Expr::Filter {
                primary: Box::new(primary),
                predicates,
            }
        };

        let mut steps = Vec::new();
        if self.eat(&Token::DoubleSlash) {
            steps.push(Step::descendant_or_self());
        } else if !self.eat(&Token::Slash) {
            return Ok(filter);
        }
        self.parse_relative_path(&mut steps)?;
        Ok(Expr::Path(LocationPath {
            start: PathStart::Expr(Box::new(filter)),
            steps,
        }))
    }

    fn parse_primary(&mut self) -> Result<Expr, XPathError> {
        match self.next() {
            Some(Token::Variable(name)) => Ok(Expr::Variable(name)),
            Some(Token::Literal(value)) => Ok(Expr::Literal(value)),
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::LeftParen) => {
                let expr = self.parse_expr()?;
                self.expect(&Token::RightParen, "')'")?;
                Ok(expr)
            }
            Some(Token::FunctionName(name)) => self.parse_function_call(name),
            Some(_) => {
                self.pos -= 1;
                Err(self.error("expected a primary expression"))
            }
            None => Err(self.error("expected a primary expression")),
        }
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expr, XPathError> {
        let Some((min, max)) = arity(&name) else {
            return Err(XPathError::UndefinedFunction { name });
        };
        self.expect(&Token::LeftParen, "'('")?;
        let mut args = Vec::new();
        if !self.check(&Token::RightParen) {
            args.push(self.parse_expr()?);
            while self.eat(&Token::Comma) {
                args.push(self.parse_expr()?);
            }
        }
        self.expect(&Token::RightParen, "')'")?;

        if args.len() < min || max.is_some_and(|m| args.len() > m) {
            let expected = match (min, max) {
                (0, Some(0)) => "no",
                (1, Some(1)) => "exactly 1",
                (0, Some(1)) => "at most 1",
                (2, Some(2)) => "exactly 2",
                (2, Some(3)) => "2 or 3",
                (3, Some(3)) => "exactly 3",
                _ => "at least 2",
            };
            return Err(XPathError::InvalidArgCount {
                function: name,
                expected,
                found: args.len(),
            });
        }
        Ok(Expr::Function { name, args })
    }

    fn at_step_start(&self) -> bool {
        matches!(
            self.peek(),
            Some(
                Token::Dot
                    | Token::DotDot
                    | Token::At
                    | Token::AxisName(_)
                    | Token::NodeType(_)
                    | Token::NameTest { .. }
            )
        )
    }

    fn parse_relative_path(&mut self, steps: &mut Vec<Step>) -> Result<(), XPathError> {
        steps.push(self.parse_step()?);
        loop {
            if self.eat(&Token::DoubleSlash) {
                steps.push(Step::descendant_or_self());
            } else if !self.eat(&Token::Slash) {
                return Ok(());
            }
            steps.push(self.parse_step()?);
        }
    }

    fn parse_step(&mut self) -> Result<Step, XPathError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let Some(Token::AxisName(axis)) = self.peek() {
            let axis = *axis;
            self.pos += 1;
            self.expect(&Token::ColonColon, "'::'")?;
            axis
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, XPathError> {
        match self.next() {
            Some(Token::NameTest { prefix, local }) => Ok(if local == "*" {
                prefix.map_or(NodeTest::Any, NodeTest::AnyIn)
            } else {
                NodeTest::Name { prefix, local }
            }),
            Some(Token::NodeType(kind)) => {
                self.expect(&Token::LeftParen, "'('")?;
                let test = match kind.as_str() {
                    "node" => NodeTest::Node,
                    "text" => NodeTest::Text,
                    "comment" => NodeTest::Comment,
                    _ => match self.peek() {
                        Some(Token::Literal(target)) => {
                            let target = target.clone();
                            self.pos += 1;
                            NodeTest::ProcessingInstruction(Some(target))
                        }
                        _ => NodeTest::ProcessingInstruction(None),
                    },
                };
                self.expect(&Token::RightParen, "')'")?;
                Ok(test)
            }
            Some(_) => {
                self.pos -= 1;
                Err(self.error("expected a node test"))
            }
            None => Err(self.error("expected a node test")),
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, XPathError> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LeftBracket) {
            predicates.push(self.parse_expr()?);
            self.expect(&Token::RightBracket, "']'")?;
        }
        Ok(predicates)
    }
}
