//! Order-preserving model of a `.env` file.
//!
//! Values are read with `dotenvy`, so quoting, escapes, multi-line quoted
//! values and `${VAR}` substitution follow the usual dotenv rules. On top of
//! that the file is split into logical lines whose original text is kept, so
//! rendering writes untouched entries, comments and unrecognised lines back
//! byte for byte (line endings included). A rewrite only changes the lines
//! whose values were actually set.

use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    /// Blank line, comment or text without a usable `KEY=`.
    Verbatim(String),
    Entry {
        key: String,
        value: String,
        /// Original text, `None` once the value has been replaced.
        raw: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum LineEnding {
    #[default]
    Lf,
    CrLf,
}

impl LineEnding {
    fn detect(content: &str) -> Self {
        if content.contains("\r\n") {
            Self::CrLf
        } else {
            Self::Lf
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// An ordered `KEY=value` mapping backed by the lines of an env file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DotEnv {
    lines: Vec<Line>,
    line_ending: LineEnding,
}

impl DotEnv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse env-file text. Never fails: lines `dotenvy` rejects are kept
    /// verbatim and contribute no entry.
    pub fn parse(content: &str) -> Self {
        let values: HashMap<String, String> = dotenvy::from_read_iter(content.as_bytes())
            .filter_map(Result::ok)
            .collect();
        let lines = logical_lines(content)
            .into_iter()
            .map(|raw| classify(raw, &values))
            .collect();
        Self {
            lines,
            line_ending: LineEnding::detect(content),
        }
    }

    /// Render back to env-file text. Rewritten and appended entries use the
    /// line ending of the parsed file.
    pub fn render(&self) -> String {
        let eol = self.line_ending.as_str();
        let mut out = String::new();
        for line in &self.lines {
            match line {
                Line::Verbatim(text)
                | Line::Entry {
                    raw: Some(text), ..
                } => out.push_str(text),
                Line::Entry {
                    key,
                    value,
                    raw: None,
                } => {
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push_str(eol);
                    }
                    out.push_str(key);
                    out.push('=');
                    out.push_str(&render_value(value));
                    out.push_str(eol);
                }
            }
        }
        out
    }

    /// Value for `key`. When a key is declared twice the last one wins,
    /// matching how shells and dotenv loaders read the file.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().rev().find_map(|line| match line {
            Line::Entry { key: k, value, .. } if k == key => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Set `key` to `value`, returning the previous value.
    ///
    /// An existing entry is updated in place (keeping its position); a new
    /// key is appended at the end of the file.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        let position = self
            .lines
            .iter()
            .rposition(|line| matches!(line, Line::Entry { key: k, .. } if *k == key));

        if let Some(Line::Entry {
            value: current,
            raw,
            ..
        }) = position.map(|idx| &mut self.lines[idx])
        {
            if *current == value {
                return Some(value);
            }
            *raw = None;
            return Some(std::mem::replace(current, value));
        }

        self.lines.push(Line::Entry {
            key,
            value,
            raw: None,
        });
        None
    }

    /// Keys in first-declaration order, without duplicates.
    pub fn keys(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.lines
            .iter()
            .filter_map(|line| match line {
                Line::Entry { key, .. } => Some(key.as_str()),
                _ => None,
            })
            .filter(|key| seen.insert(*key))
            .collect()
    }

    /// `(key, value)` pairs in first-declaration order, using the effective
    /// (last declared) value for each key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.keys()
            .into_iter()
            .filter_map(move |key| self.get(key).map(|value| (key, value)))
    }

    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        !self.lines.iter().any(|l| matches!(l, Line::Entry { .. }))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for DotEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = DotEnv::new();
        for (key, value) in iter {
            env.insert(key, value);
        }
        env
    }
}

fn classify(raw: &str, values: &HashMap<String, String>) -> Line {
    let entry = entry_key(raw).and_then(|key| values.get(key).map(|value| (key, value)));
    match entry {
        Some((key, value)) => Line::Entry {
            key: key.to_string(),
            value: value.clone(),
            raw: Some(raw.to_string()),
        },
        None => Line::Verbatim(raw.to_string()),
    }
}

fn entry_key(raw: &str) -> Option<&str> {
    let trimmed = raw.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let body = trimmed
        .strip_prefix("export ")
        .map(str::trim_start)
        .unwrap_or(trimmed);
    let (key, _) = body.split_once('=')?;
    let key = key.trim_end();
    (!key.is_empty() && !key.contains(char::is_whitespace)).then_some(key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    Bare,
    Single,
    Double,
    DoubleEscape,
    Comment,
}

/// Split `content` into logical lines, each with its terminator.
///
/// A newline inside an open quote does not end the line, the same way
/// `dotenvy` joins multi-line quoted values.
fn logical_lines(content: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut state = Scan::Bare;
    let mut after_blank = true;

    for (idx, c) in content.char_indices() {
        state = match (state, c) {
            (Scan::Single, '\'') => Scan::Bare,
            (Scan::Double, '\\') => Scan::DoubleEscape,
            (Scan::DoubleEscape, _) => Scan::Double,
            (Scan::Double, '"') => Scan::Bare,
            (Scan::Bare, '\'') => Scan::Single,
            (Scan::Bare, '"') => Scan::Double,
            (Scan::Bare, '#') if after_blank => Scan::Comment,
            (state, _) => state,
        };
        after_blank = c.is_whitespace();

        if c == '\n' && matches!(state, Scan::Bare | Scan::Comment) {
            lines.push(&content[start..=idx]);
            start = idx + 1;
            state = Scan::Bare;
        }
    }
    if start < content.len() {
        lines.push(&content[start..]);
    }
    lines
}

/// Quote `value` so `dotenvy` reads it back unchanged.
fn render_value(value: &str) -> String {
    let needs_quotes = value
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\'' | '\\' | '$'));
    if !needs_quotes {
        return value.to_string();
    }
    if !value.contains(|c| c == '\'' || c == '\n') {
        return format!("'{value}'");
    }

    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
