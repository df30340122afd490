//! Built-in arithmetic tool, always registered in the `GENERAL` category.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::registry::LocalTool;
use crate::types::{OrchestratorError, Result};

pub struct Calculator;

#[async_trait]
impl LocalTool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Perform basic arithmetic operations"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["add", "subtract", "multiply", "divide"]
                },
                "a": { "type": "number" },
                "b": { "type": "number" }
            },
            "required": ["operation", "a", "b"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value> {
        let op = args["operation"]
            .as_str()
            .ok_or_else(|| OrchestratorError::ToolError("missing required argument 'operation'".into()))?;
        let a = args["a"]
            .as_f64()
            .ok_or_else(|| OrchestratorError::ToolError("missing required argument 'a'".into()))?;
        let b = args["b"]
            .as_f64()
            .ok_or_else(|| OrchestratorError::ToolError("missing required argument 'b'".into()))?;

        let result = match op {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" if b == 0.0 => return Err(OrchestratorError::ToolError("division by zero".into())),
            "divide" => a / b,
            other => return Err(OrchestratorError::ToolError(format!("unknown operation '{other}'"))),
        };

        Ok(json!({ "result": result }))
    }
}
