//! Boolean row expressions for the `row-constraint` check.
//!
//! ```text
//! expr    := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | compare
//! compare := sum (("==" | "=" | "!=" | "<" | "<=" | ">" | ">=") sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/" | "%") unary)*
//! unary   := "-" unary | primary
//! primary := number | 'text' | "text" | true | false | null | name | "(" expr ")"
//! ```
//!
//! Names resolve to the row's values by field name. Arithmetic with a null operand is null;
//! ordering comparisons involving null are false. Expression trees deeper than
//! [`MAX_DEPTH`] are rejected.

use std::cmp::Ordering;
use std::fmt;

use serde_json::{Map, Value as J};

use crate::error::{TableError, TableResult};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Name(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn tokenize(input: &str) -> TableResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, q)) if q == c => break,
                        Some((_, ch)) => text.push(ch),
                        None => return Err(parse_error(input, "unterminated string")),
                    }
                }
                tokens.push(Token::Text(text));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let number = input[start..end]
                    .parse()
                    .map_err(|_| parse_error(input, &format!("bad number \"{}\"", &input[start..end])))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Name(input[start..end].to_string()));
            }
            _ => {
                chars.next();
                let next = chars.peek().map(|&(_, n)| n);
                let op = match (c, next) {
                    ('=', Some('=')) | ('!', Some('=')) | ('<', Some('=')) | ('>', Some('=')) => {
                        chars.next();
                        match c {
                            '=' => "==",
                            '!' => "!=",
                            '<' => "<=",
                            _ => ">=",
                        }
                    }
                    ('=', _) => "==",
                    ('<', _) => "<",
                    ('>', _) => ">",
                    ('+', _) => "+",
                    ('-', _) => "-",
                    ('*', _) => "*",
                    ('/', _) => "/",
                    ('%', _) => "%",
                    _ => return Err(parse_error(input, &format!("unexpected character '{c}'"))),
                };
                tokens.push(Token::Op(op));
            }
        }
    }
    Ok(tokens)
}

fn parse_error(input: &str, what: &str) -> TableError {
    TableError::options(format!("invalid row constraint \"{input}\": {what}"))
}

/// Deepest accepted expression tree, counting parentheses, prefix operators and chained
/// binary operators.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Literal(J),
    Name(String),
    Not(Box<Node>),
    Negate(Box<Node>),
    Binary(&'static str, Box<Node>, Box<Node>),
}

struct Parser<'a> {
    input: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn nest(&mut self) -> TableResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(parse_error(self.input, &format!("nested deeper than {MAX_DEPTH} levels")));
        }
        Ok(())
    }

    /// Parse one level further down, restoring the depth afterwards.
    fn nested(&mut self, parse: fn(&mut Self) -> TableResult<Node>) -> TableResult<Node> {
        let outer = self.depth;
        self.nest()?;
        let node = parse(self)?;
        self.depth = outer;
        Ok(node)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(n)) if n == word) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => {
                let op = *op;
                self.pos += 1;
                Some(op)
            }
            _ => None,
        }
    }

    fn or(&mut self) -> TableResult<Node> {
        let outer = self.depth;
        let mut node = self.and()?;
        while self.eat_word("or") {
            self.nest()?;
            node = Node::Binary("or", Box::new(node), Box::new(self.and()?));
        }
        self.depth = outer;
        Ok(node)
    }

    fn and(&mut self) -> TableResult<Node> {
        let outer = self.depth;
        let mut node = self.not()?;
        while self.eat_word("and") {
            self.nest()?;
            node = Node::Binary("and", Box::new(node), Box::new(self.not()?));
        }
        self.depth = outer;
        Ok(node)
    }

    fn not(&mut self) -> TableResult<Node> {
        if self.eat_word("not") {
            return Ok(Node::Not(Box::new(self.nested(Self::not)?)));
        }
        self.compare()
    }

    fn compare(&mut self) -> TableResult<Node> {
        let left = self.sum()?;
        match self.eat_op(&["==", "!=", "<", "<=", ">", ">="]) {
            Some(op) => Ok(Node::Binary(op, Box::new(left), Box::new(self.sum()?))),
            None => Ok(left),
        }
    }

    fn sum(&mut self) -> TableResult<Node> {
        let outer = self.depth;
        let mut node = self.product()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            self.nest()?;
            node = Node::Binary(op, Box::new(node), Box::new(self.product()?));
        }
        self.depth = outer;
        Ok(node)
    }

    fn product(&mut self) -> TableResult<Node> {
        let outer = self.depth;
        let mut node = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            self.nest()?;
            node = Node::Binary(op, Box::new(node), Box::new(self.unary()?));
        }
        self.depth = outer;
        Ok(node)
    }

    fn unary(&mut self) -> TableResult<Node> {
        if self.eat_op(&["-"]).is_some() {
            return Ok(Node::Negate(Box::new(self.nested(Self::unary)?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> TableResult<Node> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| parse_error(self.input, "unexpected end"))?;
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Node::Literal(number(n))),
            Token::Text(s) => Ok(Node::Literal(J::String(s))),
            Token::Name(name) => Ok(match name.as_str() {
                "true" | "True" => Node::Literal(J::Bool(true)),
                "false" | "False" => Node::Literal(J::Bool(false)),
                "null" | "None" => Node::Literal(J::Null),
                _ => Node::Name(name),
            }),
            Token::LParen => {
                let node = self.nested(Self::or)?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(node)
                    }
                    _ => Err(parse_error(self.input, "missing ')'")),
                }
            }
            other => Err(parse_error(self.input, &format!("unexpected {other:?}"))),
        }
    }
}

fn number(n: f64) -> J {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        J::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map_or(J::Null, J::Number)
    }
}

fn truthy(value: &J) -> bool {
    match value {
        J::Null => false,
        J::Bool(b) => *b,
        J::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        J::String(s) => !s.is_empty(),
        J::Array(items) => !items.is_empty(),
        J::Object(map) => !map.is_empty(),
    }
}

fn order(a: &J, b: &J) -> Option<Ordering> {
    match (a, b) {
        (J::Number(x), J::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (J::String(x), J::String(y)) => Some(x.cmp(y)),
        (J::Bool(x), J::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn equal(a: &J, b: &J) -> bool {
    match (a, b) {
        (J::Number(x), J::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// A parsed row expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    pub fn parse(input: &str) -> TableResult<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            input,
            tokens,
            pos: 0,
            depth: 0,
        };
        let root = parser.or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parse_error(input, "trailing input"));
        }
        Ok(Self {
            source: input.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against field values; fails on unknown names or incompatible operands.
    pub fn evaluate(&self, names: &Map<String, J>) -> Result<J, String> {
        eval(&self.root, names)
    }

    /// Whether the expression holds; evaluation failures count as not holding.
    pub fn holds(&self, names: &Map<String, J>) -> bool {
        self.evaluate(names).is_ok_and(|v| truthy(&v))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn eval(node: &Node, names: &Map<String, J>) -> Result<J, String> {
    match node {
        Node::Literal(v) => Ok(v.clone()),
        Node::Name(name) => names.get(name).cloned().ok_or_else(|| format!("name \"{name}\" is not defined")),
        Node::Not(inner) => Ok(J::Bool(!truthy(&eval(inner, names)?))),
        Node::Negate(inner) => match eval(inner, names)? {
            J::Null => Ok(J::Null),
            J::Number(n) => Ok(match n.as_i64() {
                Some(i) => J::from(-i),
                None => number(-n.as_f64().unwrap_or_default()),
            }),
            other => Err(format!("cannot negate {other}")),
        },
        Node::Binary("and", left, right) => {
            let left = eval(left, names)?;
            if truthy(&left) { eval(right, names) } else { Ok(left) }
        }
        Node::Binary("or", left, right) => {
            let left = eval(left, names)?;
            if truthy(&left) { Ok(left) } else { eval(right, names) }
        }
        Node::Binary(op, left, right) => {
            let left = eval(left, names)?;
            let right = eval(right, names)?;
            binary(op, &left, &right)
        }
    }
}

fn binary(op: &str, left: &J, right: &J) -> Result<J, String> {
    match op {
        "==" => return Ok(J::Bool(equal(left, right))),
        "!=" => return Ok(J::Bool(!equal(left, right))),
        "<" | "<=" | ">" | ">=" => {
            let holds = order(left, right).is_some_and(|o| match op {
                "<" => o == Ordering::Less,
                "<=" => o != Ordering::Greater,
                ">" => o == Ordering::Greater,
                _ => o != Ordering::Less,
            });
            return Ok(J::Bool(holds));
        }
        _ => {}
    }
    if left.is_null() || right.is_null() {
        return Ok(J::Null);
    }
    if let (J::String(a), J::String(b), "+") = (left, right, op) {
        return Ok(J::String(format!("{a}{b}")));
    }
    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(format!("unsupported operands for {op}: {left} and {right}"));
    };
    let integers = left.as_i64().zip(right.as_i64());
    let result = match (op, integers) {
        ("+", Some((x, y))) => x.checked_add(y).map(J::from),
        ("-", Some((x, y))) => x.checked_sub(y).map(J::from),
        ("*", Some((x, y))) => x.checked_mul(y).map(J::from),
        ("%", Some((x, y))) if y != 0 => Some(J::from(x.rem_euclid(y))),
        _ => None,
    };
    if let Some(result) = result {
        return Ok(result);
    }
    let value = match op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" | "%" if b == 0.0 => return Err("division by zero".to_string()),
        "/" => a / b,
        _ => a.rem_euclid(b),
    };
    Ok(serde_json::Number::from_f64(value).map_or(J::Null, J::Number))
}
