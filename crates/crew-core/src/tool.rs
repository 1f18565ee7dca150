//! Tool System
//!
//! Capability contract for agent tools. Tools are registered explicitly at
//! team-assembly time and invoked by name from the reasoning loop; dispatch
//! validates and coerces arguments against the declared schema and always
//! hands the loop a result object, never an unhandled error.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CrewError, Result};

/// Tool invocation request, as parsed from a reasoning step
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub name: String,

    /// Arguments as key-value pairs
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub name: String,

    /// Whether execution succeeded
    pub success: bool,

    /// Output (success message or error)
    pub output: String,

    /// Structured payload (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// State meant to influence the next prompt build, beyond the
    /// observation text itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carry_over: Option<Value>,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: true,
            output: output.into(),
            data: None,
            carry_over: None,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            success: false,
            output: error.into(),
            data: None,
            carry_over: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_carry_over(mut self, carry_over: Value) -> Self {
        self.carry_over = Some(carry_over);
        self
    }
}

/// Parameter definition for a tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
}

/// Tool definition schema, shown to the model in the tool catalogue
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,

    /// Whether the tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with validated, coerced arguments
    async fn execute(&self, call: &ToolCall) -> Result<ToolResult>;
}

/// Fill defaults, check required parameters, and coerce supplied values to
/// their declared types
///
/// Returns a description of the violated constraint on failure; dispatch
/// turns that into a failure [`ToolResult`] rather than an error.
pub fn validate_and_coerce(
    schema: &ToolSchema,
    supplied: &Map<String, Value>,
) -> std::result::Result<Map<String, Value>, String> {
    let mut coerced = supplied.clone();
    for param in &schema.parameters {
        match supplied.get(&param.name) {
            None => {
                if let Some(default) = &param.default {
                    coerced.insert(param.name.clone(), default.clone());
                } else if param.required {
                    return Err(format!("missing required parameter `{}`", param.name));
                }
            }
            Some(value) => {
                let value = coerce_value(value, &param.param_type).ok_or_else(|| {
                    format!(
                        "parameter `{}` expects type {}, got {}",
                        param.name,
                        param.param_type,
                        json_type_name(value)
                    )
                })?;
                coerced.insert(param.name.clone(), value);
            }
        }
    }
    Ok(coerced)
}

fn coerce_value(value: &Value, param_type: &str) -> Option<Value> {
    match param_type {
        "string" => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        "number" => match value {
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            _ => None,
        },
        "integer" => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| Value::Number(serde_json::Number::from(f as i64))),
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        },
        "boolean" => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        "object" => value.is_object().then(|| value.clone()),
        "array" => value.is_array().then(|| value.clone()),
        _ => Some(value.clone()),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Registry for available tools
///
/// An explicit string-key map populated at assembly time; resolution is by
/// exact name match.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let schema = tool.schema();
        self.tools.insert(schema.name, Arc::new(tool));
    }

    /// Register a shared tool
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve and run a tool call
    ///
    /// `None` when no tool matches the name (the loop proceeds with an empty
    /// observation). A matched tool always yields `Some` result: argument
    /// violations and execution errors come back as failure results.
    pub async fn dispatch(&self, call: &ToolCall) -> Option<ToolResult> {
        let tool = self.get(&call.name)?;
        let arguments = match validate_and_coerce(&tool.schema(), &call.arguments) {
            Ok(arguments) => arguments,
            Err(violation) => return Some(ToolResult::failure(&call.name, violation)),
        };
        let call = ToolCall::new(&call.name, arguments);
        match tool.execute(&call).await {
            Ok(result) => Some(result),
            Err(e) => Some(ToolResult::failure(&call.name, e.to_string())),
        }
    }

    /// Tool catalogue for prompt construction, one line per tool
    pub fn catalogue(&self) -> String {
        if self.tools.is_empty() {
            return "(none)".into();
        }
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
            .iter()
            .map(|schema| {
                let params = serde_json::to_string(&schema.parameters).unwrap_or_default();
                format!("{}: {} (parameters: {})", schema.name, schema.description, params)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Clock tool - returns the current date and time
pub struct ClockTool;

#[async_trait]
impl Tool for ClockTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "clock".into(),
            description: "Get the current date and time".into(),
            parameters: vec![
                ParameterSchema {
                    name: "format".into(),
                    param_type: "string".into(),
                    description: "Output format: 'iso', 'unix', or 'human'".into(),
                    required: false,
                    default: Some(serde_json::json!("human")),
                    enum_values: Some(vec![
                        serde_json::json!("iso"),
                        serde_json::json!("unix"),
                        serde_json::json!("human"),
                    ]),
                },
                ParameterSchema {
                    name: "timezone".into(),
                    param_type: "string".into(),
                    description: "Timezone: 'utc' or 'local'".into(),
                    required: false,
                    default: Some(serde_json::json!("utc")),
                    enum_values: Some(vec![serde_json::json!("utc"), serde_json::json!("local")]),
                },
            ],
            category: Some("time".into()),
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let format = call
            .arguments
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or("human");
        let timezone = call
            .arguments
            .get("timezone")
            .and_then(Value::as_str)
            .unwrap_or("utc");

        let output = if timezone.eq_ignore_ascii_case("local") {
            let now = chrono::Local::now();
            match format {
                "iso" => now.to_rfc3339(),
                "unix" => now.timestamp().to_string(),
                _ => now.format("%Y-%m-%d %H:%M:%S").to_string(),
            }
        } else {
            let now = chrono::Utc::now();
            match format {
                "iso" => now.to_rfc3339(),
                "unix" => now.timestamp().to_string(),
                _ => now.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            }
        };

        Ok(ToolResult::success("clock", output))
    }
}

/// Calculator tool - evaluates arithmetic expressions
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "calculator".into(),
            description: "Evaluate an arithmetic expression".into(),
            parameters: vec![ParameterSchema {
                name: "expression".into(),
                param_type: "string".into(),
                description: "Expression to evaluate, e.g. '2 + 2' or 'sqrt(16) * 3'".into(),
                required: true,
                default: None,
                enum_values: None,
            }],
            category: Some("math".into()),
            has_side_effects: false,
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let expression = call
            .arguments
            .get("expression")
            .and_then(Value::as_str)
            .ok_or_else(|| CrewError::ToolValidation("expression must be a string".into()))?;

        match evaluate(expression) {
            Ok(result) => Ok(ToolResult::success(
                "calculator",
                format!("{} = {}", expression.trim(), result),
            )
            .with_data(serde_json::json!(result))),
            Err(e) => Ok(ToolResult::failure("calculator", e)),
        }
    }
}

/// Evaluate an arithmetic expression
///
/// Supports + - * / ^, parentheses, unary minus, the constants `pi` and `e`,
/// and the functions `sqrt` and `abs`.
fn evaluate(expression: &str) -> std::result::Result<f64, String> {
    let mut parser = ExprParser {
        src: expression.as_bytes(),
        pos: 0,
    };
    let value = parser.expression()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(format!("unexpected input at offset {}", parser.pos));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".into());
    }
    Ok(value)
}

struct ExprParser<'a> {
    src: &'a [u8],
    pos: usize,
}

impl ExprParser<'_> {
    fn skip_ws(&mut self) {
        while self.src.get(self.pos) == Some(&b' ') {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.src.get(self.pos).copied()
    }

    fn expression(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == b'+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> std::result::Result<f64, String> {
        let mut value = self.power()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.pos += 1;
            let rhs = self.power()?;
            if op == b'/' {
                if rhs == 0.0 {
                    return Err("division by zero".into());
                }
                value /= rhs;
            } else {
                value *= rhs;
            }
        }
        Ok(value)
    }

    fn power(&mut self) -> std::result::Result<f64, String> {
        let base = self.unary()?;
        if self.peek() == Some(b'^') {
            self.pos += 1;
            // Right-associative
            let exponent = self.power()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> std::result::Result<f64, String> {
        if self.peek() == Some(b'-') {
            self.pos += 1;
            return Ok(-self.unary()?);
        }
        self.atom()
    }

    fn atom(&mut self) -> std::result::Result<f64, String> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.expression()?;
                if self.peek() != Some(b')') {
                    return Err("missing closing parenthesis".into());
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.ident(),
            _ => Err(format!("expected a value at offset {}", self.pos)),
        }
    }

    fn number(&mut self) -> std::result::Result<f64, String> {
        let start = self.pos;
        while matches!(self.src.get(self.pos), Some(c) if c.is_ascii_digit() || *c == b'.') {
            self.pos += 1;
        }
        std::str::from_utf8(&self.src[start..self.pos])
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| format!("invalid number at offset {start}"))
    }

    fn ident(&mut self) -> std::result::Result<f64, String> {
        let start = self.pos;
        while matches!(self.src.get(self.pos), Some(c) if c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let name = std::str::from_utf8(&self.src[start..self.pos])
            .map_err(|_| format!("invalid identifier at offset {start}"))?;
        match name {
            "pi" => Ok(std::f64::consts::PI),
            "e" => Ok(std::f64::consts::E),
            "sqrt" | "abs" => {
                if self.peek() != Some(b'(') {
                    return Err(format!("{name} requires parentheses"));
                }
                self.pos += 1;
                let argument = self.expression()?;
                if self.peek() != Some(b')') {
                    return Err("missing closing parenthesis".into());
                }
                self.pos += 1;
                match name {
                    "sqrt" if argument < 0.0 => Err("sqrt of a negative number".into()),
                    "sqrt" => Ok(argument.sqrt()),
                    _ => Ok(argument.abs()),
                }
            }
            _ => Err(format!("unknown function or constant `{name}`")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate() {
        assert!((evaluate("2 + 2").unwrap() - 4.0).abs() < f64::EPSILON);
        assert!((evaluate("(2 + 3) * 4").unwrap() - 20.0).abs() < f64::EPSILON);
        assert!((evaluate("2 ^ 8").unwrap() - 256.0).abs() < f64::EPSILON);
        assert!((evaluate("sqrt(16) + abs(-3)").unwrap() - 7.0).abs() < f64::EPSILON);
        assert!((evaluate("-3 * -2").unwrap() - 6.0).abs() < f64::EPSILON);
        assert!((evaluate("2 * pi").unwrap() - std::f64::consts::TAU).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_errors() {
        assert!(evaluate("1 / 0").is_err());
        assert!(evaluate("sqrt(-1)").is_err());
        assert!(evaluate("2 +").is_err());
        assert!(evaluate("nope(3)").is_err());
        assert!(evaluate("(1 + 2").is_err());
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(ClockTool);
        registry.register(CalculatorTool);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["calculator", "clock"]);
        assert!(registry.get("calculator").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool_is_none() {
        let registry = ToolRegistry::new();
        let call = ToolCall::new("missing", Map::new());
        assert!(registry.dispatch(&call).await.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_missing_required_is_failure() {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool);

        let call = ToolCall::new("calculator", Map::new());
        let result = registry.dispatch(&call).await.unwrap();
        assert!(!result.success);
        assert!(result.output.contains("expression"));
    }

    #[tokio::test]
    async fn test_dispatch_calculator() {
        let mut registry = ToolRegistry::new();
        registry.register(CalculatorTool);

        let mut arguments = Map::new();
        arguments.insert("expression".into(), Value::String("2+2".into()));
        let result = registry.dispatch(&ToolCall::new("calculator", arguments)).await.unwrap();
        assert!(result.success);
        assert!(result.output.contains('4'));
    }

    #[test]
    fn test_coercion() {
        let schema = ToolSchema {
            name: "t".into(),
            description: String::new(),
            parameters: vec![
                ParameterSchema {
                    name: "text".into(),
                    param_type: "string".into(),
                    description: String::new(),
                    required: true,
                    default: None,
                    enum_values: None,
                },
                ParameterSchema {
                    name: "count".into(),
                    param_type: "integer".into(),
                    description: String::new(),
                    required: false,
                    default: Some(serde_json::json!(5)),
                    enum_values: None,
                },
                ParameterSchema {
                    name: "flag".into(),
                    param_type: "boolean".into(),
                    description: String::new(),
                    required: false,
                    default: None,
                    enum_values: None,
                },
            ],
            category: None,
            has_side_effects: false,
        };

        let mut supplied = Map::new();
        supplied.insert("text".into(), serde_json::json!(12));
        supplied.insert("flag".into(), serde_json::json!("true"));
        let coerced = validate_and_coerce(&schema, &supplied).unwrap();
        assert_eq!(coerced.get("text"), Some(&serde_json::json!("12")));
        assert_eq!(coerced.get("count"), Some(&serde_json::json!(5)));
        assert_eq!(coerced.get("flag"), Some(&serde_json::json!(true)));

        let mut bad = Map::new();
        bad.insert("text".into(), serde_json::json!("ok"));
        bad.insert("count".into(), serde_json::json!("many"));
        let err = validate_and_coerce(&schema, &bad).unwrap_err();
        assert!(err.contains("count"));
    }
}
