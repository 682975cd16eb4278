//! Expression language used inside `[...]` substitutions and `%` assignments
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or      := and ( "||" and )*
//! and     := compare ( "&&" compare )*
//! compare := sum ( ("==" | "!=" | "<" | "<=" | ">" | ">=") sum )?
//! sum     := product ( ("+" | "-") product )*
//! product := unary ( ("*" | "/" | "%") unary )*
//! unary   := ("-" | "!") unary | primary
//! primary := number | string | "true" | "false" | ident | ident "(" args ")" | "(" or ")"
//! ```

use super::{Context, Value};
use crate::error::GcodeError;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

const OPERATORS: [&str; 15] = [
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "+", "-", "*", "/", "%", "!", "=",
];

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit()))
        {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| format!("bad number '{}'", text))?;
            tokens.push(Token::Number(value));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.')
            {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
            continue;
        }
        if c == '"' || c == '\'' {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|&ch| ch == c)
                .map(|p| start + p)
                .ok_or_else(|| "unterminated string".to_string())?;
            tokens.push(Token::Text(chars[start..end].iter().collect()));
            i = end + 1;
            continue;
        }
        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            ',' => tokens.push(Token::Comma),
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let op = OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .ok_or_else(|| format!("unexpected character '{}'", c))?;
                tokens.push(Token::Op(*op));
                i += op.len();
                continue;
            }
        }
        i += 1;
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    context: &'a Context,
}

impl Parser<'_> {
    fn peek_op(&self) -> Option<&'static str> {
        match self.tokens.get(self.pos) {
            Some(Token::Op(op)) => Some(op),
            _ => None,
        }
    }

    fn eat_op(&mut self, candidates: &[&str]) -> Option<&'static str> {
        let op = self.peek_op().filter(|op| candidates.contains(op))?;
        self.pos += 1;
        Some(op)
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        if self.tokens.get(self.pos) == Some(&token) {
            self.pos += 1;
            Ok(())
        } else {
            Err(format!("expected {:?}", token))
        }
    }

    fn or(&mut self) -> Result<Value, String> {
        let mut left = self.and()?;
        while self.eat_op(&["||"]).is_some() {
            let right = self.and()?;
            left = Value::Bool(left.truthy() || right.truthy());
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Value, String> {
        let mut left = self.compare()?;
        while self.eat_op(&["&&"]).is_some() {
            let right = self.compare()?;
            left = Value::Bool(left.truthy() && right.truthy());
        }
        Ok(left)
    }

    fn compare(&mut self) -> Result<Value, String> {
        let left = self.sum()?;
        let Some(op) = self.eat_op(&["==", "!=", "<", "<=", ">", ">="]) else {
            return Ok(left);
        };
        let right = self.sum()?;
        let result = match op {
            "==" => left.loosely_equals(&right),
            "!=" => !left.loosely_equals(&right),
            _ => {
                let (a, b) = (left.as_number()?, right.as_number()?);
                match op {
                    "<" => a < b,
                    "<=" => a <= b,
                    ">" => a > b,
                    _ => a >= b,
                }
            }
        };
        Ok(Value::Bool(result))
    }

    fn sum(&mut self) -> Result<Value, String> {
        let mut left = self.product()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let right = self.product()?;
            let next = match (op, &left, &right) {
                ("+", Value::Text(a), b) => Value::Text(format!("{}{}", a, b)),
                ("+", a, Value::Text(b)) => Value::Text(format!("{}{}", a, b)),
                ("+", a, b) => Value::Number(a.as_number()? + b.as_number()?),
                (_, a, b) => Value::Number(a.as_number()? - b.as_number()?),
            };
            left = next;
        }
        Ok(left)
    }

    fn product(&mut self) -> Result<Value, String> {
        let mut left = self.unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let right = self.unary()?.as_number()?;
            let a = left.as_number()?;
            left = Value::Number(match op {
                "*" => a * right,
                "/" => {
                    if right == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    a / right
                }
                _ => {
                    if right == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    a % right
                }
            });
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Value, String> {
        match self.eat_op(&["-", "!"]) {
            Some("-") => Ok(Value::Number(-self.unary()?.as_number()?)),
            Some(_) => Ok(Value::Bool(!self.unary()?.truthy())),
            None => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Value, String> {
        let token = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| "unexpected end of expression".to_string())?;
        self.pos += 1;
        match token {
            Token::Number(n) => Ok(Value::Number(n)),
            Token::Text(s) => Ok(Value::Text(s)),
            Token::LParen => {
                let value = self.or()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Token::Ident(name) if self.tokens.get(self.pos) == Some(&Token::LParen) => {
                self.pos += 1;
                let mut args = Vec::new();
                if self.tokens.get(self.pos) != Some(&Token::RParen) {
                    loop {
                        args.push(self.or()?.as_number()?);
                        if self.tokens.get(self.pos) == Some(&Token::Comma) {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(Token::RParen)?;
                call(&name, &args).map(Value::Number)
            }
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => self
                    .context
                    .get(&name)
                    .cloned()
                    .ok_or_else(|| format!("'{}' is not defined", name)),
            },
            other => Err(format!("unexpected {:?}", other)),
        }
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, String> {
    let one = || {
        if args.len() == 1 {
            Ok(args[0])
        } else {
            Err(format!("{}() takes one argument", name))
        }
    };
    match name {
        "abs" => one().map(f64::abs),
        "floor" => one().map(f64::floor),
        "ceil" => one().map(f64::ceil),
        "round" => one().map(f64::round),
        "sqrt" => one().map(f64::sqrt),
        "min" | "max" if args.is_empty() => Err(format!("{}() needs arguments", name)),
        "min" => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        _ => Err(format!("unknown function '{}'", name)),
    }
}

/// Evaluate one expression against a context
pub fn evaluate(expression: &str, context: &Context) -> Result<Value, GcodeError> {
    let tokens = tokenize(expression).map_err(|reason| GcodeError::InvalidExpression {
        expression: expression.to_string(),
        reason,
    })?;
    if tokens.is_empty() {
        return Err(GcodeError::InvalidExpression {
            expression: expression.to_string(),
            reason: "empty expression".to_string(),
        });
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        context,
    };
    let value = parser.or().map_err(|reason| GcodeError::Evaluation {
        expression: expression.to_string(),
        reason,
    })?;
    if parser.pos != parser.tokens.len() {
        return Err(GcodeError::InvalidExpression {
            expression: expression.to_string(),
            reason: "trailing input".to_string(),
        });
    }
    Ok(value)
}
