//! Prompt sentinel grammar.
//!
//! A prepared shell prints `execmux[<status>]» ` before every command, so
//! each prompt line in scrollback is a boundary: it closes the previous
//! command with `<status>` and, when followed by text, opens the next one.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

pub const PROMPT_LABEL: &str = "execmux";

/// Glyph that ends the sentinel prompt.
pub const TERMINATOR: &str = "»";

fn boundary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Lazy prefix: the prompt is the first bracketed status on the line,
    // anything after it is the typed command.
    RE.get_or_init(|| Regex::new(r"^.*?\[(\d+)\]» ?(.*)$").expect("static regex"))
}

/// A prompt line split into the status it reports and whatever was typed
/// after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary<'a> {
    pub status: i32,
    pub trailing: &'a str,
}

pub fn parse_boundary(line: &str) -> Option<Boundary<'_>> {
    let caps = boundary_re().captures(line)?;
    let status = caps.get(1)?.as_str().parse().ok()?;
    let trailing = caps.get(2).map_or("", |m| m.as_str().trim());
    Some(Boundary { status, trailing })
}

/// True when `line` is a sentinel prompt waiting for input.
pub fn is_ready_prompt(line: &str) -> bool {
    parse_boundary(line).is_some_and(|b| b.trailing.is_empty())
}

pub fn count_boundaries(content: &str) -> usize {
    content.lines().filter(|l| parse_boundary(l).is_some()).count()
}

// ─── Shell dialects ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellDialect {
    Bash,
    Zsh,
    Fish,
}

impl ShellDialect {
    pub const ALL: [Self; 3] = [Self::Bash, Self::Zsh, Self::Fish];

    /// Map a shell name (`/bin/zsh`, `-bash`, `fish`) to a dialect.
    /// Shells without a way to print the last exit status in the prompt
    /// (`sh`, `dash`, ...) return `None`.
    pub fn from_shell_name(name: &str) -> Option<Self> {
        match normalize_shell_name(name) {
            "bash" => Some(Self::Bash),
            "zsh" => Some(Self::Zsh),
            "fish" => Some(Self::Fish),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Fish => "fish",
        }
    }

    /// Command that installs the sentinel prompt in this shell.
    ///
    /// Prompt hooks are cleared too: they would otherwise overwrite the
    /// prompt (zsh themes) or clobber `$?` before it is printed (bash).
    pub fn prompt_command(self) -> &'static str {
        match self {
            Self::Bash => "PROMPT_COMMAND=''; PS1='execmux[$?]» '",
            Self::Zsh => "precmd_functions=(); RPROMPT=''; PROMPT='execmux[%?]» '",
            Self::Fish => {
                "function fish_prompt; echo -n \"execmux[$status]» \"; end; function fish_right_prompt; end"
            }
        }
    }
}

impl fmt::Display for ShellDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShellDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_shell_name(s).ok_or_else(|| format!("unsupported shell: {s}"))
    }
}

/// Basename of a shell path with the login-shell `-` prefix removed.
pub fn normalize_shell_name(name: &str) -> &str {
    let name = name.trim();
    let base = name.rsplit('/').next().unwrap_or(name);
    base.strip_prefix('-').unwrap_or(base)
}
