//! Heuristic risk classification of shell command lines.
//!
//! A command line is split into components (sequence operators and
//! command substitutions), each component is checked against dangerous
//! rules and then safe rules, and output redirections are checked
//! against protected path prefixes. The overall level is the maximum.

use crate::types::{RiskAssessment, RiskFlag, RiskLevel};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

// ─── Rules ────────────────────────────────────────────────────────

struct RuleDef {
    id: &'static str,
    pattern: &'static str,
}

const fn rule(id: &'static str, pattern: &'static str) -> RuleDef {
    RuleDef { id, pattern }
}

const DANGEROUS_RULES: &[RuleDef] = &[
    // destructive filesystem
    rule("rm_recursive_force", r"\brm\s+(.*\s)?-[a-zA-Z]*([rR][a-zA-Z]*f|f[a-zA-Z]*[rR])"),
    rule("rm_root_path", r"\brm\s+(-\S+\s+)*/"),
    rule("find_delete", r"\bfind\b.*-delete\b"),
    rule("find_exec", r"\bfind\b.*-exec\b"),
    rule("xargs_rm", r"\bxargs\s+rm\b"),
    rule("mkfs", r"\bmkfs\b"),
    rule("dd_to_device", r"\bdd\s+.*of=/dev/"),
    rule("fdisk", r"\bfdisk\b"),
    rule("parted", r"\bparted\b"),
    rule("sed_delete_all", r":\s*,\s*\$\s*d\b"),
    rule("truncate_zero", r"\btruncate\s+-s\s*0"),
    // privilege escalation
    rule("sudo", r"\bsudo\b"),
    rule("su", r"\bsu\s"),
    rule("doas", r"\bdoas\b"),
    // permissions
    rule("chmod_exec_bits", r"\bchmod\s+[0-7]*[67][0-7]*\b"),
    rule("chmod_777", r"\bchmod\s+777"),
    rule("chown_root", r"\bchown\s+.*root"),
    // code execution
    rule("pipe_to_shell", r"\|\s*(sh|bash|zsh|fish)\b"),
    rule("eval", r"\beval\s"),
    rule("exec", r"\bexec\s"),
    rule("curl_pipe_shell", r"\bcurl\b.*\|\s*(sh|bash)"),
    rule("wget_pipe_shell", r"\bwget\b.*\|\s*(sh|bash)"),
    rule("source_network", r"\bsource\s+/dev/(tcp|udp)"),
    rule("dot_source_network", r"\.\s+/dev/(tcp|udp)"),
    rule("perl_inline", r"\bperl\s+-e"),
    rule("python_inline", r"\bpython3?\s+-c"),
    rule("ruby_inline", r"\bruby\s+-e"),
    rule("awk_system", r"\bawk\s+.*system\("),
    rule("fork_bomb", r":\(\)\s*\{.*:\|:"),
    // system state
    rule("service_stop", r"\b(systemctl|service)\s+(stop|disable|mask)"),
    rule("reboot", r"\breboot\b"),
    rule("shutdown", r"\bshutdown\b"),
    rule("halt", r"\bhalt\b"),
    rule("poweroff", r"\bpoweroff\b"),
    rule("killall", r"\bkillall\b"),
    rule("pkill", r"\bpkill\b"),
    rule("kill_9", r"\bkill\s+-9"),
    rule("init_runlevel", r"\binit\s+[016]"),
    // package removal
    rule("apt_remove", r"\bapt(-get)?\s+(remove|purge|autoremove)"),
    rule("yum_remove", r"\byum\s+(remove|erase)"),
    rule("dnf_remove", r"\bdnf\s+(remove|erase)"),
    rule("pacman_remove", r"\bpacman\s+-R"),
    rule("brew_remove", r"\bbrew\s+(uninstall|remove)"),
    rule("npm_global_remove", r"\bnpm\s+(uninstall|remove)\s+-g"),
    // disks
    rule("umount_root", r"\bumount\s+/"),
    rule("fsck", r"\bfsck\b"),
    rule("mount_rw", r"\bmount\s+.*-o.*rw"),
    // databases
    rule("db_client_drop", r"(?i)\b(mysql|psql|mongo)\b.*\bdrop\s+(database|table)"),
    rule("sql_drop", r"\bDROP\s+(DATABASE|TABLE)\b"),
    // containers
    rule("docker_force_remove", r"\bdocker\s+(rm|rmi)\s+.*-f"),
    rule("docker_prune_all", r"\bdocker\s+system\s+prune\s+.*-a"),
    rule("kubectl_delete", r"\bkubectl\s+delete"),
    rule("compose_down_volumes", r"\bdocker\s+compose\s+down\s+.*-v"),
    // git
    rule("git_force_push", r"\bgit\s+push\s+.*(--force|-f\b)"),
    rule("git_clean", r"\bgit\s+clean\s+.*-[fFdDxX]"),
    rule("git_reset_hard", r"\bgit\s+reset\s+.*--hard"),
    rule("git_branch_force_delete", r"\bgit\s+branch\s+.*-D"),
    // scheduling
    rule("crontab_remove", r"\bcrontab\s+-r"),
];

const SAFE_RULES: &[RuleDef] = &[
    rule("ls", r"^ls(\s|$)"),
    rule("pwd", r"^pwd(\s|$)"),
    rule("cd", r"^cd(\s|$)"),
    rule("cat_relative", r"^cat\s+[^/|><&;]"),
    rule("head", r"^head(\s|$)"),
    rule("tail", r"^tail(\s|$)"),
    rule("less", r"^less(\s|$)"),
    rule("more", r"^more(\s|$)"),
    rule("file", r"^file(\s|$)"),
    rule("stat", r"^stat(\s|$)"),
    rule("tree", r"^tree(\s|$)"),
    rule("grep", r"^grep(\s|$)"),
    rule("find", r"^find(\s|$)"),
    rule("rg", r"^rg(\s|$)"),
    rule("ag", r"^ag(\s|$)"),
    rule("ack", r"^ack(\s|$)"),
    rule("locate", r"^locate(\s|$)"),
    rule("which", r"^which(\s|$)"),
    rule("whoami", r"^whoami(\s|$)"),
    rule("date", r"^date(\s|$)"),
    rule("uptime", r"^uptime(\s|$)"),
    rule("uname", r"^uname(\s|$)"),
    rule("hostname", r"^hostname(\s|$)"),
    rule("ps", r"^ps(\s|$)"),
    rule("top", r"^top(\s|$)"),
    rule("htop", r"^htop(\s|$)"),
    rule("git_read", r"^git\s+(status|log|diff|show|branch)"),
    rule("git_ls_files", r"^git\s+ls-files"),
    rule("git_remote", r"^git\s+remote"),
    rule("npm_read", r"^npm\s+(list|ls|view|info)"),
    rule("yarn_read", r"^yarn\s+(list|info)"),
    rule("go_read", r"^go\s+(version|env|list)"),
    rule("cargo_read", r"^cargo\s+(--version|version|tree|metadata)"),
    rule("docker_read", r"^docker\s+(ps|images|inspect)"),
    rule("compose_read", r"^docker\s+compose\s+(ps|config)"),
    rule("echo", r"^echo(\s|$)"),
    rule("wc", r"^wc(\s|$)"),
    rule("sort", r"^sort(\s|$)"),
    rule("uniq", r"^uniq(\s|$)"),
    rule("cut", r"^cut(\s|$)"),
    rule("awk", r"^awk(\s|$)"),
    rule("sed_no_flags", r"^sed\s+[^-]"),
    rule("ping", r"^ping(\s|$)"),
    rule("traceroute", r"^traceroute(\s|$)"),
    rule("nslookup", r"^nslookup(\s|$)"),
    rule("dig", r"^dig(\s|$)"),
    rule("host", r"^host(\s|$)"),
    rule("curl", r"^curl\s+[^|]"),
    rule("wget", r"^wget\s+[^|]"),
    rule("netstat", r"^netstat(\s|$)"),
    rule("ss", r"^ss(\s|$)"),
    rule("ifconfig", r"^ifconfig(\s|$)"),
    rule("ip_read", r"^ip\s+(addr|route|link)"),
    rule("df", r"^df(\s|$)"),
    rule("du", r"^du(\s|$)"),
    rule("free", r"^free(\s|$)"),
    rule("lsof", r"^lsof(\s|$)"),
];

/// Redirect targets under these prefixes are always dangerous.
pub const PROTECTED_PREFIXES: &[&str] = &["/etc/", "/sys/", "/proc/", "/dev/", "/boot/", "/root/"];

struct CompiledRule {
    id: &'static str,
    re: Regex,
}

fn compile(defs: &[RuleDef]) -> Vec<CompiledRule> {
    defs.iter()
        .filter_map(|d| {
            Regex::new(d.pattern)
                .ok()
                .map(|re| CompiledRule { id: d.id, re })
        })
        .collect()
}

fn dangerous_rules() -> &'static [CompiledRule] {
    static RULES: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    RULES.get_or_init(|| compile(DANGEROUS_RULES))
}

fn safe_rules() -> &'static [CompiledRule] {
    static RULES: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    RULES.get_or_init(|| compile(SAFE_RULES))
}

// ─── Components ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOp {
    Write,
    Append,
}

impl RedirectOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Write => ">",
            Self::Append => ">>",
        }
    }
}

impl fmt::Display for RedirectOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub op: RedirectOp,
    pub target: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Simple,
    Substitution,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub text: String,
    pub kind: ComponentKind,
    pub redirects: Vec<Redirect>,
}

/// Split a command line into independently scored components.
///
/// Sequence operators (`;`, `&&`, `||`, newline) separate components.
/// The body of every `$(...)` or backtick substitution becomes its own
/// component, listed before the component that contains it.
pub fn decompose(command: &str) -> Vec<Component> {
    let mut out = Vec::new();
    decompose_into(command, ComponentKind::Simple, &mut out);
    out
}

fn decompose_into(command: &str, kind: ComponentKind, out: &mut Vec<Component>) {
    for part in split_sequence(command) {
        for inner in substitutions(part) {
            decompose_into(inner, ComponentKind::Substitution, out);
        }
        out.push(Component {
            text: part.to_string(),
            kind,
            redirects: redirects(part),
        });
    }
}

/// Tracks quoting while walking a command byte by byte.
#[derive(Default)]
struct Quoting {
    single: bool,
    double: bool,
    backtick: bool,
    escaped: bool,
    depth: usize,
    opening: bool,
}

impl Quoting {
    /// Advance over `b`; returns true when `b` sits at the top level of
    /// the command (unquoted and outside any substitution).
    fn step(&mut self, b: u8, next: Option<u8>) -> bool {
        if self.escaped {
            self.escaped = false;
            return false;
        }
        if self.single {
            if b == b'\'' {
                self.single = false;
            }
            return false;
        }
        match b {
            b'\\' => self.escaped = true,
            b'\'' if !self.double => self.single = true,
            b'"' => self.double = !self.double,
            b'`' => self.backtick = !self.backtick,
            b'$' if next == Some(b'(') => {
                self.depth += 1;
                self.opening = true;
            }
            b'(' if self.opening => self.opening = false,
            b'(' if self.depth > 0 => self.depth += 1,
            b')' if self.depth > 0 => self.depth -= 1,
            _ => return !self.double && !self.backtick && self.depth == 0,
        }
        false
    }
}

fn split_sequence(input: &str) -> Vec<&str> {
    let bytes = input.as_bytes();
    let mut quoting = Quoting::default();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let next = bytes.get(i + 1).copied();
        if quoting.step(bytes[i], next) {
            let sep = match (bytes[i], next) {
                (b';' | b'\n', _) => 1,
                (b'&', Some(b'&')) | (b'|', Some(b'|')) => 2,
                _ => 0,
            };
            if sep > 0 {
                parts.push(&input[start..i]);
                i += sep;
                start = i;
                continue;
            }
        }
        i += 1;
    }
    parts.push(&input[start..]);
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Index of the `)` matching the `(` at `open`.
fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut single = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if escaped {
            escaped = false;
            continue;
        }
        if single {
            single = b != b'\'';
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'\'' => single = true,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Bodies of the outermost command substitutions in `component`.
fn substitutions(component: &str) -> Vec<&str> {
    let bytes = component.as_bytes();
    let mut found = Vec::new();
    let mut single = false;
    let mut double = false;
    let mut escaped = false;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if escaped {
            escaped = false;
        } else if single {
            single = b != b'\'';
        } else {
            match b {
                b'\\' => escaped = true,
                b'\'' if !double => single = true,
                b'"' => double = !double,
                // `$((...))` is arithmetic, not a command
                b'$' if bytes.get(i + 1) == Some(&b'(') && bytes.get(i + 2) != Some(&b'(') => {
                    if let Some(end) = matching_paren(bytes, i + 1) {
                        found.push(&component[i + 2..end]);
                        i = end + 1;
                        continue;
                    }
                }
                b'`' => {
                    if let Some(len) = bytes[i + 1..].iter().position(|&c| c == b'`') {
                        found.push(&component[i + 1..i + 1 + len]);
                        i += len + 2;
                        continue;
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    found
}

/// Output redirections (`>`, `>>`, `&>`, `N>`) at the top level of
/// `component`. Descriptor duplication such as `2>&1` is not a file write.
fn redirects(component: &str) -> Vec<Redirect> {
    let bytes = component.as_bytes();
    let mut quoting = Quoting::default();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let next = bytes.get(i + 1).copied();
        if quoting.step(bytes[i], next) && bytes[i] == b'>' {
            let (op, mut j) = if next == Some(b'>') {
                (RedirectOp::Append, i + 2)
            } else {
                (RedirectOp::Write, i + 1)
            };
            match bytes.get(j) {
                Some(b'&') => {
                    i = j + 1;
                    continue;
                }
                Some(b'|') => j += 1,
                _ => {}
            }
            while bytes.get(j).is_some_and(|b| b.is_ascii_whitespace()) {
                j += 1;
            }
            let (target, end) = read_word(component, j);
            if !target.is_empty() {
                found.push(Redirect { op, target });
            }
            i = end.max(j);
            continue;
        }
        i += 1;
    }
    found
}

/// Read one shell word starting at `start`, removing quotes. Returns the
/// word and the index just past it.
fn read_word(s: &str, start: usize) -> (String, usize) {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut single = false;
    let mut double = false;
    let mut i = start;
    while i < bytes.len() {
        let b = bytes[i];
        if single {
            if b == b'\'' {
                single = false;
            } else {
                out.push(b);
            }
        } else if double {
            if b == b'"' {
                double = false;
            } else {
                out.push(b);
            }
        } else {
            match b {
                b'\'' => single = true,
                b'"' => double = true,
                b'$' if bytes.get(i + 1) == Some(&b'(') => {
                    let end = matching_paren(bytes, i + 1).unwrap_or(bytes.len() - 1);
                    out.extend_from_slice(&bytes[i..=end]);
                    i = end + 1;
                    continue;
                }
                b if b.is_ascii_whitespace() || b";|&<>()".contains(&b) => break,
                _ => out.push(b),
            }
        }
        i += 1;
    }
    (String::from_utf8_lossy(&out).into_owned(), i)
}

// ─── Scoring ──────────────────────────────────────────────────────

/// Level of a single component and the ids of the rules that decided it.
pub fn evaluate_component(text: &str) -> (RiskLevel, Vec<&'static str>) {
    let text = text.trim();
    if text.is_empty() {
        return (RiskLevel::Safe, Vec::new());
    }

    let hits: Vec<&'static str> = dangerous_rules()
        .iter()
        .filter(|r| r.re.is_match(text))
        .map(|r| r.id)
        .collect();
    if !hits.is_empty() {
        return (RiskLevel::Danger, hits);
    }

    if safe_rules().iter().any(|r| r.re.is_match(text)) {
        return (RiskLevel::Safe, Vec::new());
    }
    (RiskLevel::Unknown, Vec::new())
}

pub fn check_redirect(redirect: &Redirect) -> RiskLevel {
    if PROTECTED_PREFIXES
        .iter()
        .any(|p| redirect.target.starts_with(p))
    {
        RiskLevel::Danger
    } else {
        // Substituted or ordinary targets may still overwrite something.
        RiskLevel::Unknown
    }
}

/// Classify a full command line.
pub fn classify(command: &str) -> RiskAssessment {
    let components = decompose(command);
    if components.is_empty() {
        return RiskAssessment::safe();
    }

    let mut assessment = RiskAssessment::safe();
    for (index, component) in components.iter().enumerate() {
        let (level, ids) = evaluate_component(&component.text);
        assessment.level = assessment.level.max(level);
        assessment
            .flags
            .extend(ids.into_iter().map(|id| RiskFlag {
                component: index,
                rule: id.to_string(),
            }));

        for redirect in &component.redirects {
            let level = check_redirect(redirect);
            assessment.level = assessment.level.max(level);
            assessment.flags.push(RiskFlag {
                component: index,
                rule: format!("redirect_{}_{}", redirect.op, redirect.target),
            });
        }
    }
    assessment
}
