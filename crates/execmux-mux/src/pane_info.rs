//! tmux `list-panes` format string and parser.

use crate::error::MuxError;
use execmux_core::PaneDetails;

/// Comma-separated format string for `tmux list-panes -F`.
pub const LIST_PANES_FORMAT: &str =
    "#{pane_id},#{pane_active},#{pane_pid},#{pane_current_command},#{history_size},#{history_limit}";

/// Format that prints the window a pane lives in, usable as a `-t` target.
pub const WINDOW_TARGET_FORMAT: &str = "#{session_id}:#{window_index}";

/// Parse the raw output of `tmux list-panes -F <LIST_PANES_FORMAT>`.
pub fn parse_list_panes_output(output: &str) -> Result<Vec<PaneDetails>, MuxError> {
    let mut panes = Vec::new();
    for (idx, line) in output.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        panes.push(parse_line(line, idx + 1)?);
    }
    Ok(panes)
}

fn parse_line(line: &str, line_num: usize) -> Result<PaneDetails, MuxError> {
    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < 6 {
        return Err(MuxError::Parse {
            line_num,
            detail: format!("expected 6 comma-separated fields, got {}", parts.len()),
        });
    }
    // The command name is the only free-text field; commas in it are
    // rejoined from whatever sits between the fixed leading and trailing fields.
    let tail = parts.len() - 2;

    let mut pane = PaneDetails::new(parts[0].trim());
    pane.is_active = parse_bool(parts[1]);
    pane.pid = parts[2].trim().parse().ok();
    pane.command = parts[3..tail].join(",").trim().to_string();
    pane.history_size = parts[tail].trim().parse().unwrap_or(0);
    pane.history_limit = parts[tail + 1].trim().parse().unwrap_or(0);
    Ok(pane)
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim(), "1" | "true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_line() {
        let pane = parse_line("%3,1,4242,zsh,120,2000", 1).expect("should parse");
        assert_eq!(pane.id, "%3");
        assert!(pane.is_active);
        assert_eq!(pane.pid, Some(4242));
        assert_eq!(pane.command, "zsh");
        assert_eq!(pane.history_size, 120);
        assert_eq!(pane.history_limit, 2000);
        assert!(pane.content.is_empty());
        assert!(!pane.is_prepared);
    }

    #[test]
    fn parse_multiple_panes() {
        let output = "%0,1,100,claude,0,2000\n%1,0,101,bash,50,2000\n";
        let panes = parse_list_panes_output(output).expect("should parse");
        assert_eq!(panes.len(), 2);
        assert_eq!(panes[0].id, "%0");
        assert!(!panes[1].is_active);
        assert_eq!(panes[1].command, "bash");
    }

    #[test]
    fn empty_numeric_fields_default() {
        let pane = parse_line("%0,0,,vim,,", 1).expect("should parse");
        assert_eq!(pane.pid, None);
        assert_eq!(pane.command, "vim");
        assert_eq!(pane.history_size, 0);
        assert_eq!(pane.history_limit, 0);
    }

    #[test]
    fn command_with_commas_is_rejoined() {
        let pane = parse_line("%2,0,77,a,b,c,5,100", 1).expect("should parse");
        assert_eq!(pane.command, "a,b,c");
        assert_eq!(pane.history_size, 5);
        assert_eq!(pane.history_limit, 100);
    }

    #[test]
    fn too_few_fields_is_an_error() {
        let err = parse_list_panes_output("%0,1\n").unwrap_err();
        assert!(matches!(err, MuxError::Parse { line_num: 1, .. }));
    }

    #[test]
    fn blank_lines_skipped() {
        assert!(parse_list_panes_output("\n  \n").expect("should parse").is_empty());
    }
}
