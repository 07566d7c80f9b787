//! Special-key tokens inside text sent to a pane.
//!
//! A whitespace-separated word that is exactly a key name (`Enter`, `C-c`,
//! `M-x`, `F5`, ...) is sent as a key press; everything else is literal.
//! tmux receives key names, zellij receives the raw terminal bytes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKey {
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Enter,
    Escape,
    Tab,
    BackTab,
    Space,
    Backspace,
    Delete,
    Insert,
    /// F1..=F12
    F(u8),
    Ctrl(char),
    Meta(char),
}

impl SpecialKey {
    /// Parse a single word as a key name. Returns `None` for literal text.
    pub fn parse(word: &str) -> Option<Self> {
        let named = match word {
            "Up" => Some(Self::Up),
            "Down" => Some(Self::Down),
            "Left" => Some(Self::Left),
            "Right" => Some(Self::Right),
            "Home" => Some(Self::Home),
            "End" => Some(Self::End),
            "PageUp" | "PgUp" | "PPage" => Some(Self::PageUp),
            "PageDown" | "PgDn" | "NPage" => Some(Self::PageDown),
            "Enter" => Some(Self::Enter),
            "Escape" => Some(Self::Escape),
            "Tab" => Some(Self::Tab),
            "BTab" => Some(Self::BackTab),
            "Space" => Some(Self::Space),
            "BSpace" => Some(Self::Backspace),
            "DC" => Some(Self::Delete),
            "IC" => Some(Self::Insert),
            _ => None,
        };
        if named.is_some() {
            return named;
        }

        if let Some(n) = word.strip_prefix('F') {
            return match n.parse::<u8>() {
                Ok(v @ 1..=12) if v.to_string() == n => Some(Self::F(v)),
                _ => None,
            };
        }

        for (prefix, ctrl) in [("C-", true), ("Ctrl-", true), ("M-", false), ("Meta-", false)] {
            if let Some(rest) = word.strip_prefix(prefix) {
                let mut chars = rest.chars();
                return match (chars.next(), chars.next()) {
                    (Some(c), None) if c.is_ascii_graphic() => Some(if ctrl {
                        Self::Ctrl(c)
                    } else {
                        Self::Meta(c)
                    }),
                    _ => None,
                };
            }
        }
        None
    }

    /// Name understood by `tmux send-keys`.
    pub fn tmux_name(self) -> String {
        match self {
            Self::Up => "Up".into(),
            Self::Down => "Down".into(),
            Self::Left => "Left".into(),
            Self::Right => "Right".into(),
            Self::Home => "Home".into(),
            Self::End => "End".into(),
            Self::PageUp => "PPage".into(),
            Self::PageDown => "NPage".into(),
            Self::Enter => "Enter".into(),
            Self::Escape => "Escape".into(),
            Self::Tab => "Tab".into(),
            Self::BackTab => "BTab".into(),
            Self::Space => "Space".into(),
            Self::Backspace => "BSpace".into(),
            Self::Delete => "DC".into(),
            Self::Insert => "IC".into(),
            Self::F(n) => format!("F{n}"),
            Self::Ctrl(c) => format!("C-{}", c.to_ascii_lowercase()),
            Self::Meta(c) => format!("M-{c}"),
        }
    }

    /// Bytes a VT100-style terminal emits for this key.
    pub fn terminal_bytes(self) -> Vec<u8> {
        match self {
            Self::Up => b"\x1b[A".to_vec(),
            Self::Down => b"\x1b[B".to_vec(),
            Self::Right => b"\x1b[C".to_vec(),
            Self::Left => b"\x1b[D".to_vec(),
            Self::Home => b"\x1b[H".to_vec(),
            Self::End => b"\x1b[F".to_vec(),
            Self::PageUp => b"\x1b[5~".to_vec(),
            Self::PageDown => b"\x1b[6~".to_vec(),
            Self::Enter => vec![b'\r'],
            Self::Escape => vec![0x1b],
            Self::Tab => vec![b'\t'],
            Self::BackTab => b"\x1b[Z".to_vec(),
            Self::Space => vec![b' '],
            Self::Backspace => vec![0x7f],
            Self::Delete => b"\x1b[3~".to_vec(),
            Self::Insert => b"\x1b[2~".to_vec(),
            Self::F(n) => function_key_bytes(n),
            Self::Ctrl(c) => vec![control_byte(c)],
            Self::Meta(c) => {
                let mut bytes = vec![0x1b];
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                bytes
            }
        }
    }
}

fn function_key_bytes(n: u8) -> Vec<u8> {
    let seq: &[u8] = match n {
        1 => b"\x1bOP",
        2 => b"\x1bOQ",
        3 => b"\x1bOR",
        4 => b"\x1bOS",
        5 => b"\x1b[15~",
        6 => b"\x1b[17~",
        7 => b"\x1b[18~",
        8 => b"\x1b[19~",
        9 => b"\x1b[20~",
        10 => b"\x1b[21~",
        11 => b"\x1b[23~",
        _ => b"\x1b[24~",
    };
    seq.to_vec()
}

fn control_byte(c: char) -> u8 {
    match c.to_ascii_lowercase() {
        c @ 'a'..='z' => c as u8 - b'a' + 1,
        '@' | ' ' | '2' => 0,
        '[' | '3' => 0x1b,
        '\\' | '4' => 0x1c,
        ']' | '5' => 0x1d,
        '^' | '6' => 0x1e,
        '_' | '7' | '/' => 0x1f,
        '?' | '8' => 0x7f,
        other => other as u8 & 0x1f,
    }
}

impl fmt::Display for SpecialKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tmux_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySegment {
    Literal(String),
    Key(SpecialKey),
}

/// Split one line of input into literal runs and key presses.
///
/// The single space separating a key word from its neighbours is dropped;
/// any other spacing inside literal runs is kept.
pub fn tokenize_line(line: &str) -> Vec<KeySegment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut after_key = false;

    for (i, word) in line.split(' ').enumerate() {
        if let Some(key) = SpecialKey::parse(word) {
            if !literal.is_empty() {
                segments.push(KeySegment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(KeySegment::Key(key));
            after_key = true;
            continue;
        }
        if i > 0 && !after_key {
            literal.push(' ');
        }
        literal.push_str(word);
        after_key = false;
    }
    if !literal.is_empty() {
        segments.push(KeySegment::Literal(literal));
    }
    segments
}
