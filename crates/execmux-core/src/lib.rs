//! execmux-core: data model, prompt grammar, history parser and risk
//! classification for commands run in a shared terminal pane.
//!
//! Everything here is pure: no IO, no async.

pub mod approval;
pub mod chat;
pub mod history;
pub mod prompt;
pub mod risk;
pub mod types;

pub use approval::{ApprovalDecision, ApprovalError, ApprovalPolicy, ApprovalReason, Verdict};
pub use chat::{ChatCompleter, ChatError, ChatMessage, Role};
pub use history::parse_history;
pub use prompt::ShellDialect;
pub use risk::classify;
pub use types::{CommandExecHistory, PaneDetails, RiskAssessment, RiskFlag, RiskLevel};
