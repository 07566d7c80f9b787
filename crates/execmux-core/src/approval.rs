//! Decide whether a command may run without asking the user.

use crate::risk::classify;
use crate::types::{RiskAssessment, RiskLevel};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("invalid {list} pattern {pattern:?}: {source}")]
    InvalidPattern {
        list: &'static str,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    AutoApprove,
    Confirm,
    /// Confirm, and warn that the command was classified as dangerous.
    ConfirmDanger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalReason {
    Yolo,
    Whitelisted,
    Blacklisted,
    ClassifiedSafe,
    Classified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalDecision {
    pub verdict: Verdict,
    pub reason: ApprovalReason,
    pub assessment: RiskAssessment,
}

impl ApprovalDecision {
    pub fn is_approved(&self) -> bool {
        self.verdict == Verdict::AutoApprove
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApprovalPolicy {
    whitelist: Vec<Regex>,
    blacklist: Vec<Regex>,
    auto_exec_safe: bool,
    yolo: bool,
}

impl ApprovalPolicy {
    pub fn new(
        whitelist: &[String],
        blacklist: &[String],
        auto_exec_safe: bool,
        yolo: bool,
    ) -> Result<Self, ApprovalError> {
        Ok(Self {
            whitelist: compile_list("whitelist", whitelist)?,
            blacklist: compile_list("blacklist", blacklist)?,
            auto_exec_safe,
            yolo,
        })
    }

    /// Approve everything without asking.
    pub fn yolo() -> Self {
        Self {
            yolo: true,
            ..Self::default()
        }
    }

    /// Yolo approves everything. Otherwise a blacklist match always asks;
    /// a whitelist match, or a safe classification with `auto_exec_safe`,
    /// runs without asking.
    pub fn decide(&self, command: &str) -> ApprovalDecision {
        let assessment = classify(command);
        let (verdict, reason) = if self.yolo {
            (Verdict::AutoApprove, ApprovalReason::Yolo)
        } else if self.blacklist.iter().any(|re| re.is_match(command)) {
            (confirm_for(assessment.level), ApprovalReason::Blacklisted)
        } else if self.whitelist.iter().any(|re| re.is_match(command)) {
            (Verdict::AutoApprove, ApprovalReason::Whitelisted)
        } else if self.auto_exec_safe && assessment.level == RiskLevel::Safe {
            (Verdict::AutoApprove, ApprovalReason::ClassifiedSafe)
        } else {
            (confirm_for(assessment.level), ApprovalReason::Classified)
        };
        ApprovalDecision {
            verdict,
            reason,
            assessment,
        }
    }
}

fn confirm_for(level: RiskLevel) -> Verdict {
    if level == RiskLevel::Danger {
        Verdict::ConfirmDanger
    } else {
        Verdict::Confirm
    }
}

fn compile_list(list: &'static str, patterns: &[String]) -> Result<Vec<Regex>, ApprovalError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| ApprovalError::InvalidPattern {
                list,
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}
