use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Pane ─────────────────────────────────────────────────────────

/// Snapshot of a terminal pane as seen through a multiplexer.
///
/// `content` and `last_line` are only refreshed by a capture; a metadata
/// refresh from a pane listing keeps them (and `is_prepared`) untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaneDetails {
    pub id: String,
    pub is_active: bool,
    pub pid: Option<u32>,
    /// Foreground command name as reported by the multiplexer.
    pub command: String,
    pub command_args: Vec<String>,
    /// Basename of the pane's login shell, e.g. `zsh`.
    pub shell: String,
    pub content: String,
    pub last_line: String,
    pub is_exec_pane: bool,
    pub is_agent_pane: bool,
    pub is_prepared: bool,
    pub is_sub_shell: bool,
    pub history_size: u32,
    pub history_limit: u32,
}

impl PaneDetails {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Replace the captured content and derive `last_line` from it.
    pub fn set_content(&mut self, content: String) {
        self.last_line = last_line_of(&content).to_string();
        self.content = content;
    }

    /// Copy listing metadata from `fresh` while keeping capture state.
    pub fn merge_metadata(&mut self, fresh: PaneDetails) {
        self.is_active = fresh.is_active;
        self.pid = fresh.pid;
        self.command = fresh.command;
        self.command_args = fresh.command_args;
        self.shell = fresh.shell;
        self.is_sub_shell = fresh.is_sub_shell;
        self.history_size = fresh.history_size;
        self.history_limit = fresh.history_limit;
    }
}

/// Final non-empty line of `content`, without trailing whitespace.
pub fn last_line_of(content: &str) -> &str {
    content
        .trim_end()
        .rsplit('\n')
        .next()
        .map(str::trim)
        .unwrap_or_default()
}

// ─── Command history ──────────────────────────────────────────────

/// One command reconstructed from pane scrollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandExecHistory {
    pub command: String,
    pub output: String,
    /// Exit status printed by the prompt that closed this command, or
    /// [`CommandExecHistory::UNTERMINATED`] if no prompt followed it yet.
    pub code: i32,
}

impl CommandExecHistory {
    pub const UNTERMINATED: i32 = -1;

    pub fn is_terminated(&self) -> bool {
        self.code != Self::UNTERMINATED
    }
}

// ─── Risk ─────────────────────────────────────────────────────────

/// Ordered so that the overall level of a command is the `max` of its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Unknown,
    Danger,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Unknown => "unknown",
            Self::Danger => "danger",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "safe" => Ok(Self::Safe),
            "unknown" => Ok(Self::Unknown),
            "danger" => Ok(Self::Danger),
            _ => Err(format!("unknown risk level: {s}")),
        }
    }
}

/// A matched rule, tagged with the index of the command component it came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RiskFlag {
    pub component: usize,
    pub rule: String,
}

impl fmt::Display for RiskFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "component_{}_{}", self.component, self.rule)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub flags: Vec<RiskFlag>,
}

impl RiskAssessment {
    pub fn safe() -> Self {
        Self {
            level: RiskLevel::Safe,
            flags: Vec::new(),
        }
    }

    pub fn flag_names(&self) -> Vec<String> {
        self.flags.iter().map(ToString::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_line_skips_trailing_blank_lines() {
        assert_eq!(last_line_of("a\nb  \n\n\n"), "b");
        assert_eq!(last_line_of(""), "");
        assert_eq!(last_line_of("   \n  "), "");
        assert_eq!(last_line_of("only"), "only");
    }

    #[test]
    fn merge_metadata_keeps_capture_state() {
        let mut pane = PaneDetails::new("%1");
        pane.set_content("x[0]» ls\nfile\nx[0]»".into());
        pane.is_prepared = true;
        pane.is_exec_pane = true;

        let mut fresh = PaneDetails::new("%1");
        fresh.command = "zsh".into();
        fresh.pid = Some(42);
        fresh.history_size = 10;
        pane.merge_metadata(fresh);

        assert_eq!(pane.command, "zsh");
        assert_eq!(pane.pid, Some(42));
        assert_eq!(pane.history_size, 10);
        assert!(pane.is_prepared);
        assert!(pane.is_exec_pane);
        assert_eq!(pane.last_line, "x[0]»");
        assert!(pane.content.contains("file"));
    }

    #[test]
    fn risk_levels_are_ordered() {
        assert!(RiskLevel::Safe < RiskLevel::Unknown);
        assert!(RiskLevel::Unknown < RiskLevel::Danger);
        assert_eq!(
            [RiskLevel::Unknown, RiskLevel::Danger, RiskLevel::Safe]
                .into_iter()
                .max(),
            Some(RiskLevel::Danger)
        );
    }

    #[test]
    fn risk_level_round_trips_through_str() {
        for level in [RiskLevel::Safe, RiskLevel::Unknown, RiskLevel::Danger] {
            assert_eq!(level.as_str().parse::<RiskLevel>(), Ok(level));
        }
        assert!("high".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn flag_display_carries_component_index() {
        let flag = RiskFlag {
            component: 2,
            rule: "sudo".into(),
        };
        assert_eq!(flag.to_string(), "component_2_sudo");
    }
}
