//! Tool registry and invoker for Switchyard.
//!
//! Tools give the agent the ability to act: the registry validates each
//! call against the tool's JSON Schema before running it, and tags the
//! reserved final-answer tool so the agent loop knows when to stop.

pub mod final_answer;
pub mod registry;

pub use final_answer::{FINAL_ANSWER_TOOL, FinalAnswerTool};
pub use registry::{ToolInvocation, ToolOutcome, ToolRegistry, validate_arguments};
