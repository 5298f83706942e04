//! Agent run state.
//!
//! `AgentState` is owned by one run for its whole life. Every history append
//! goes through [`AgentState::record`] so the observer sees it immediately.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use switchyard_core::{Message, ToolCall, ToolCallResult};
use uuid::Uuid;

/// Lifecycle of a run: `pending → running → {completed, failed}`.
/// A run that hits its iteration cap stays `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEntry {
    /// The task, assistant text, or a corrective user message
    Message(Message),
    /// A tool call made by the model (with its accompanying text)
    ToolCall(ToolCall),
    ToolCallResult(ToolCallResult),
}

impl HistoryEntry {
    pub fn as_tool_call(&self) -> Option<&ToolCall> {
        match self {
            Self::ToolCall(call) => Some(call),
            _ => None,
        }
    }
}

/// Called with the state and the entry just appended to its history.
pub type Observer<'a> = dyn FnMut(&AgentState, &HistoryEntry) + Send + 'a;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: String,
    pub task: String,
    pub system_prompt: String,
    pub history: Vec<HistoryEntry>,
    pub iteration_count: u32,
    pub max_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentState {
    pub fn new(task: impl Into<String>, system_prompt: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            task: task.into(),
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            iteration_count: 0,
            max_iterations: max_iterations.max(1),
            final_answer: None,
            status: AgentStatus::Pending,
            failure_reason: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// Append `entry` and notify the observer.
    pub fn record(&mut self, entry: HistoryEntry, observer: &mut Option<&mut Observer<'_>>) {
        self.history.push(entry);
        if let (Some(observer), Some(last)) = (observer.as_deref_mut(), self.history.last()) {
            observer(self, last);
        }
    }

    pub fn start(&mut self) {
        self.status = AgentStatus::Running;
        self.started_at.get_or_insert_with(Utc::now);
    }

    pub fn complete(&mut self, answer: impl Into<String>) {
        self.final_answer = Some(answer.into());
        self.status = AgentStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure_reason = Some(reason.into());
        self.status = AgentStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.status, AgentStatus::Completed | AgentStatus::Failed)
    }
}
