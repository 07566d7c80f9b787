//! `execmux classify`: risk tier and approval verdict without running anything.

use crate::cli::ClassifyOpts;
use crate::config::Config;
use execmux_core::{ApprovalDecision, RiskLevel};

/// Exit code per risk tier: 0 safe, 1 unknown, 2 danger.
pub fn exit_code_for(level: RiskLevel) -> i32 {
    match level {
        RiskLevel::Safe => 0,
        RiskLevel::Unknown => 1,
        RiskLevel::Danger => 2,
    }
}

pub fn cmd_classify(config: &Config, opts: ClassifyOpts, json: bool) -> anyhow::Result<i32> {
    let command = opts.command.join(" ");
    let decision = config.approval_policy()?.decide(&command);
    if json {
        let value = serde_json::json!({ "command": command, "decision": decision });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", format_decision(&decision));
    }
    Ok(exit_code_for(decision.assessment.level))
}

fn format_decision(decision: &ApprovalDecision) -> String {
    let mut out = format!(
        "{} ({:?}, {:?})\n",
        decision.assessment.level, decision.verdict, decision.reason
    );
    for flag in &decision.assessment.flags {
        out.push_str(&format!("  {flag}\n"));
    }
    out
}
