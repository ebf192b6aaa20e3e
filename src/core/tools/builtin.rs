//! Tools that ship with the client and need no external server.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use super::{Tool, ToolError, ToolRegistry, ToolSchema};

pub fn register_builtin_tools(registry: &mut ToolRegistry) {
    registry.register(Arc::new(CalculatorTool));
    registry.register(Arc::new(CurrentTimeTool));
}

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "calculator",
            "Evaluate an arithmetic expression. Supports + - * / % ^ and parentheses.",
            json!({
                "type": "object",
                "properties": {
                    "expr": {
                        "type": "string",
                        "description": "Expression to evaluate, e.g. (2 + 3) * 4"
                    }
                },
                "required": ["expr"],
                "additionalProperties": false
            }),
        )
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let expr = arguments
            .get("expr")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing string field 'expr'".into()))?;
        let value = evaluate(expr).map_err(ToolError::Execution)?;
        Ok(format_number(value))
    }
}

pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "current_time",
            "Return the current date and time in RFC 3339 format.",
            json!({
                "type": "object",
                "properties": {
                    "utc": {
                        "type": "boolean",
                        "description": "Report UTC instead of local time"
                    }
                },
                "additionalProperties": false
            }),
        )
    }

    async fn invoke(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let utc = arguments
            .get("utc")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let now = if utc {
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        } else {
            Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
        };
        Ok(now)
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

const MAX_NESTING: usize = 256;

/// Evaluates `expr` with the usual precedence: `^` (right associative) binds
/// tighter than unary minus, which binds tighter than `* / %`, then `+ -`.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let mut parser = ExprParser {
        chars: expr.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
        depth: 0,
    };
    if parser.chars.is_empty() {
        return Err("Empty expression".to_string());
    }
    let value = parser.parse_sum()?;
    if let Some(c) = parser.peek() {
        return Err(format!("Unexpected '{c}' at position {}", parser.pos + 1));
    }
    if !value.is_finite() {
        return Err("Result is not a finite number".to_string());
    }
    Ok(value)
}

struct ExprParser {
    chars: Vec<char>,
    pos: usize,
    // Open parentheses, unary signs and exponents above the current token.
    depth: usize,
}

impl ExprParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn parse_sum(&mut self) -> Result<f64, String> {
        let mut value = self.parse_product()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.parse_product()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn parse_product(&mut self) -> Result<f64, String> {
        let mut value = self.parse_unary()?;
        while let Some(op @ ('*' | '/' | '%')) = self.peek() {
            self.pos += 1;
            let rhs = self.parse_unary()?;
            value = match op {
                '*' => value * rhs,
                _ if rhs == 0.0 => return Err("Division by zero".to_string()),
                '/' => value / rhs,
                _ => value % rhs,
            };
        }
        Ok(value)
    }

    fn parse_unary(&mut self) -> Result<f64, String> {
        if self.depth >= MAX_NESTING {
            return Err("Expression nested too deeply".to_string());
        }
        self.depth += 1;
        let value = self.parse_signed();
        self.depth -= 1;
        value
    }

    fn parse_signed(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.parse_unary()?)
            }
            Some('+') => {
                self.pos += 1;
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<f64, String> {
        let base = self.parse_atom()?;
        if self.peek() == Some('^') {
            self.pos += 1;
            let exponent = self.parse_unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn parse_atom(&mut self) -> Result<f64, String> {
        match self.bump() {
            Some('(') => {
                let value = self.parse_sum()?;
                match self.bump() {
                    Some(')') => Ok(value),
                    _ => Err("Missing closing parenthesis".to_string()),
                }
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let start = self.pos - 1;
                while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
                    self.pos += 1;
                }
                let literal: String = self.chars[start..self.pos].iter().collect();
                literal
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid number '{literal}'"))
            }
            Some(c) => Err(format!("Unexpected '{c}' at position {}", self.pos)),
            None => Err("Unexpected end of expression".to_string()),
        }
    }
}
