//! The reserved final-answer tool. Calling it ends an agent run.

use async_trait::async_trait;
use serde_json::{Value, json};
use switchyard_core::{Tool, ToolContext, ToolDefinition, ToolError};

pub const FINAL_ANSWER_TOOL: &str = "agent_final_answer";

pub struct FinalAnswerTool;

impl FinalAnswerTool {
    pub fn definition() -> ToolDefinition {
        FinalAnswerTool.to_definition()
    }
}

#[async_trait]
impl Tool for FinalAnswerTool {
    fn name(&self) -> &str {
        FINAL_ANSWER_TOOL
    }

    fn description(&self) -> &str {
        "Provide the final answer to the task. Call this exactly once, when the task is complete."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "final_answer": {
                    "type": "string",
                    "description": "The complete answer to the task"
                }
            },
            "required": ["final_answer"]
        })
    }

    async fn execute(&self, arguments: &Value, _context: &ToolContext) -> Result<Value, ToolError> {
        Ok(arguments["final_answer"].clone())
    }
}
