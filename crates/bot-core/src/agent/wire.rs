use std::fmt;

use serde::{Deserialize, Serialize};

/// Commands answered by reading world state rather than changing it.
pub const QUERY_COMMANDS: [&str; 6] = [
    "stats",
    "inventory",
    "nearbyBlocks",
    "entities",
    "savedPlaces",
    "viewChest",
];

pub fn is_query_name(name: &str) -> bool {
    QUERY_COMMANDS.contains(&name)
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Arg {
    Number(f64),
    Text(String),
}

impl Arg {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Arg::Number(n) => Some(*n),
            Arg::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }

    /// Integer prefix of the argument: `12` for `12.7`, `"12abc"` or `" 12"`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Arg::Number(n) => Some(n.trunc() as i64),
            Arg::Text(s) => leading_int(s),
        }
    }

    pub fn text(&self) -> String {
        self.to_string()
    }
}

fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let digits_from = usize::from(s.starts_with(['-', '+']));
    let digits = s[digits_from..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    s[..digits_from + digits].parse().ok()
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Arg::Number(n) => write!(f, "{n}"),
            Arg::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Command {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Arg>,
}

impl Command {
    pub fn new(name: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    pub fn is_query(&self) -> bool {
        is_query_name(&self.name)
    }

    pub fn arg(&self, idx: usize) -> Option<&Arg> {
        self.args.get(idx)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{}", self.name)?;
        if !self.args.is_empty() {
            let joined: Vec<String> = self.args.iter().map(Arg::to_string).collect();
            write!(f, "({})", joined.join(", "))?;
        }
        Ok(())
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Extracts every `!name(args)` occurrence from free-form model text, in order.
///
/// The parenthesized list is optional and cannot contain `)`. A `(` with no closing `)`
/// yields a command with no arguments. Never fails; text without commands yields nothing.
pub fn parse_commands(text: &str) -> Vec<Command> {
    let bytes = text.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'!' {
            i += 1;
            continue;
        }
        let name_start = i + 1;
        let name_end = name_start
            + bytes[name_start..]
                .iter()
                .take_while(|b| is_word_byte(**b))
                .count();
        if name_end == name_start {
            i += 1;
            continue;
        }

        let mut args = Vec::new();
        let mut next = name_end;
        if bytes.get(name_end) == Some(&b'(')
            && let Some(close) = text[name_end + 1..].find(')')
        {
            let inner = &text[name_end + 1..name_end + 1 + close];
            args = split_args(inner);
            next = name_end + 1 + close + 1;
        }

        out.push(Command::new(&text[name_start..name_end], args));
        i = next;
    }
    out
}

/// Splits an argument list on commas outside quotes.
///
/// A segment wrapped in matching single or double quotes is kept verbatim (quotes removed,
/// commas and spaces preserved). Other segments are trimmed and become numbers when they
/// parse as finite numbers. Empty segments are dropped.
pub fn split_args(list: &str) -> Vec<Arg> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in list.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None if ch == ',' => segments.push(std::mem::take(&mut current)),
            None => {
                if (ch == '"' || ch == '\'') && current.trim().is_empty() {
                    quote = Some(ch);
                }
                current.push(ch);
            }
        }
    }
    segments.push(current);

    segments.iter().filter_map(|seg| classify(seg)).collect()
}

fn classify(segment: &str) -> Option<Arg> {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return None;
    }
    for q in ['"', '\''] {
        if trimmed.len() >= 2 && trimmed.starts_with(q) && trimmed.ends_with(q) {
            let inner = &trimmed[1..trimmed.len() - 1];
            if !inner.contains(q) {
                return Some(Arg::Text(inner.to_string()));
            }
        }
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => Some(Arg::Number(n)),
        _ => Some(Arg::Text(trimmed.to_string())),
    }
}
