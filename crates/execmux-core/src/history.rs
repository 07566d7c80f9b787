//! Rebuild command history from captured pane text.

use crate::prompt::parse_boundary;
use crate::types::CommandExecHistory;

enum State {
    /// Before the first prompt, or after a prompt with nothing typed.
    Idle,
    Open { command: String, output: String },
}

/// Parse scrollback into command records, oldest first.
///
/// Every prompt line closes the open command with the status it prints
/// and opens a new one if text follows the prompt. Output lines are
/// attached to the open command, or dropped when none is open. A command
/// still open at the end of the input is returned with
/// [`CommandExecHistory::UNTERMINATED`].
pub fn parse_history(content: &str) -> Vec<CommandExecHistory> {
    let mut records = Vec::new();
    let mut state = State::Idle;

    for line in content.lines() {
        match parse_boundary(line) {
            Some(boundary) => {
                if let State::Open { command, output } = state {
                    records.push(close(command, output, boundary.status));
                }
                state = if boundary.trailing.is_empty() {
                    State::Idle
                } else {
                    State::Open {
                        command: boundary.trailing.to_string(),
                        output: String::new(),
                    }
                };
            }
            None => {
                if let State::Open { output, .. } = &mut state {
                    output.push_str(line);
                    output.push('\n');
                }
            }
        }
    }

    if let State::Open { command, output } = state {
        records.push(close(command, output, CommandExecHistory::UNTERMINATED));
    }
    records
}

fn close(command: String, mut output: String, code: i32) -> CommandExecHistory {
    if output.ends_with('\n') {
        output.pop();
    }
    CommandExecHistory {
        command,
        output,
        code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rec(command: &str, output: &str, code: i32) -> CommandExecHistory {
        CommandExecHistory {
            command: command.into(),
            output: output.into(),
            code,
        }
    }

    #[test]
    fn two_commands_then_ready_prompt() {
        let content = "A[0]» ls\nfile1\nfile2\nA[0]» echo x\nx\nA[0]» ";
        assert_eq!(
            parse_history(content),
            vec![rec("ls", "file1\nfile2", 0), rec("echo x", "x", 0)]
        );
    }

    #[test]
    fn status_comes_from_the_closing_prompt() {
        let content = "A[0]» false\nA[1]» true\nA[0]»";
        assert_eq!(
            parse_history(content),
            vec![rec("false", "", 1), rec("true", "", 0)]
        );
    }

    #[test]
    fn running_command_is_unterminated() {
        let content = "A[0]» sleep 10\npartial";
        let records = parse_history(content);
        assert_eq!(records, vec![rec("sleep 10", "partial", -1)]);
        assert!(!records[0].is_terminated());
    }

    #[test]
    fn text_before_first_prompt_is_ignored() {
        let content = "Last login: today\nwelcome\nA[0]» pwd\n/home\nA[0]»";
        assert_eq!(parse_history(content), vec![rec("pwd", "/home", 0)]);
    }

    #[test]
    fn output_after_empty_prompt_is_dropped() {
        let content = "A[0]»\nstray\nA[0]» id\nuid=0\nA[0]»";
        assert_eq!(parse_history(content), vec![rec("id", "uid=0", 0)]);
    }

    #[test]
    fn blank_output_lines_are_kept_inside() {
        let content = "A[0]» printf 'a\\n\\nb'\na\n\nb\nA[0]»";
        assert_eq!(
            parse_history(content),
            vec![rec("printf 'a\\n\\nb'", "a\n\nb", 0)]
        );
    }

    #[test]
    fn empty_and_promptless_input() {
        assert!(parse_history("").is_empty());
        assert!(parse_history("no prompt here\nat all").is_empty());
    }

    proptest! {
        #[test]
        fn never_panics(content in ".{0,400}") {
            let _ = parse_history(&content);
        }

        #[test]
        fn only_the_last_record_can_be_unterminated(
            lines in prop::collection::vec(
                prop_oneof![
                    "[a-z ]{0,12}",
                    (0u8..3, "[a-z]{0,6}").prop_map(|(s, c)| format!("A[{s}]» {c}")),
                ],
                0..30,
            )
        ) {
            let records = parse_history(&lines.join("\n"));
            if records.len() > 1 {
                for r in &records[..records.len() - 1] {
                    prop_assert!(r.is_terminated());
                }
            }
        }

        #[test]
        fn output_never_ends_with_the_joining_newline(
            outputs in prop::collection::vec("[a-z]{1,8}", 1..6)
        ) {
            let content = format!("A[0]» cmd\n{}\nA[3]»", outputs.join("\n"));
            let records = parse_history(&content);
            prop_assert_eq!(records.len(), 1);
            prop_assert_eq!(&records[0].output, &outputs.join("\n"));
            prop_assert_eq!(records[0].code, 3);
        }
    }
}
