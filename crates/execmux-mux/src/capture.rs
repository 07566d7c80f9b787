//! Post-processing shared by every backend's capture.

/// Keep at most the last `max_lines` lines of `content`, dropping the
/// blank rows a multiplexer pads below the cursor.
pub fn tail_lines(content: &str, max_lines: usize) -> String {
    let trimmed = content.trim_end();
    if max_lines == 0 {
        return String::new();
    }
    let lines: Vec<&str> = trimmed.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}
