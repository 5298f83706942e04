//! The agent loop for Switchyard.
//!
//! The agent works through a task by calling tools:
//!
//! 1. **Send** the history, system prompt and tool set to the chat gateway
//! 2. **Record** the model's tool call (or its plain text)
//! 3. **Act**: validate and run the tool, or append a corrective message
//! 4. **Stop** when the final-answer tool runs, the gateway fails, or the
//!    iteration cap is reached
//!
//! Every history append is reported to an optional observer as it happens.

pub mod history;
pub mod prompt;
pub mod runner;
pub mod state;

pub use history::to_messages;
pub use prompt::DEFAULT_SYSTEM_PROMPT;
pub use runner::AgentLoop;
pub use state::{AgentState, AgentStatus, HistoryEntry, Observer};
