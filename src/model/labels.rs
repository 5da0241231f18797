//! Commit-message labels and the trailer-block rules.
//!
//! A label line is `<name>: <value>` where the name is alphanumeric plus
//! `-_`. Labels live in the *trailer block*: the run of consecutive label
//! lines at the very end of a message. A commit may carry the same label
//! name multiple times; the last occurrence is authoritative for scalar
//! lookups, but all occurrences are preserved in order.
//!
//! Appending follows the one rule everything downstream depends on: when a
//! trailer block already ends the message, new labels join it with no blank
//! line; otherwise a blank line opens a new block.

use std::fmt;

// ---------------------------------------------------------------------------
// Label
// ---------------------------------------------------------------------------

/// One `name: value` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Whether `name` is a legal label name (`[A-Za-z0-9_-]+`).
#[must_use]
pub fn is_valid_label_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Whether `line` is a label line (`^[A-Za-z0-9_-]+:\s.*$`).
#[must_use]
pub fn is_label_line(line: &str) -> bool {
    parse_label_line(line).is_some()
}

/// Split a label line into `(name, value)`. The value is everything after
/// the separating whitespace.
#[must_use]
pub fn parse_label_line(line: &str) -> Option<(&str, &str)> {
    let (name, rest) = line.split_once(':')?;
    if !is_valid_label_name(name) {
        return None;
    }
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_whitespace() => Some((name, chars.as_str())),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// LabelSet — ordered, duplicate-preserving multimap
// ---------------------------------------------------------------------------

/// An ordered multimap of labels. Duplicates are preserved in order; the
/// last occurrence of a name wins scalar lookups.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelSet {
    entries: Vec<Label>,
}

impl LabelSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Label::new(name, value));
    }

    /// All values carried under `name`, in order of appearance.
    #[must_use]
    pub fn all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|l| l.name == name)
            .map(|l| l.value.as_str())
            .collect()
    }

    /// The authoritative (last) value of `name`.
    #[must_use]
    pub fn last(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Label> {
        self.entries.iter()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Render as a label block: one line per label, trailing newline.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for label in &self.entries {
            out.push_str(&label.to_string());
            out.push('\n');
        }
        out
    }

    /// Parse every label line in `text` (in order), ignoring non-label
    /// lines.
    #[must_use]
    pub fn parse_block(text: &str) -> Self {
        let mut set = Self::new();
        for line in text.lines() {
            if let Some((name, value)) = parse_label_line(line) {
                set.add(name, value);
            }
        }
        set
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a Label;
    type IntoIter = std::slice::Iter<'a, Label>;
    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

// ---------------------------------------------------------------------------
// Message shape
// ---------------------------------------------------------------------------

/// The first line of a message.
#[must_use]
pub fn summary(message: &str) -> &str {
    message.lines().next().unwrap_or_default()
}

/// Labels in the final trailing label block of `message`.
///
/// The block is the run of consecutive label lines at the end (ignoring
/// trailing blank lines). A message consisting only of label lines is all
/// block.
#[must_use]
pub fn trailer_block(message: &str) -> LabelSet {
    let lines: Vec<&str> = message.lines().collect();
    let mut end = lines.len();
    while end > 0 && lines[end - 1].trim().is_empty() {
        end -= 1;
    }
    let mut start = end;
    while start > 0 && is_label_line(lines[start - 1]) {
        start -= 1;
    }
    let mut set = LabelSet::new();
    for line in &lines[start..end] {
        if let Some((name, value)) = parse_label_line(line) {
            set.add(name, value);
        }
    }
    set
}

/// Append `name: value` to `message` per the trailer rule: join an existing
/// trailing label block without a blank line, otherwise open a new block
/// after one blank line. The result always ends with a single newline.
#[must_use]
pub fn append_label(message: &str, name: &str, value: &str) -> String {
    let body = message.trim_end_matches('\n');
    if body.is_empty() {
        return format!("{name}: {value}\n");
    }
    let ends_in_block = body.lines().next_back().is_some_and(is_label_line);
    if ends_in_block {
        format!("{body}\n{name}: {value}\n")
    } else {
        format!("{body}\n\n{name}: {value}\n")
    }
}

/// How many times `name: ...` occurs across the whole message.
#[must_use]
pub fn count_label(message: &str, name: &str) -> usize {
    message
        .lines()
        .filter_map(parse_label_line)
        .filter(|(n, _)| *n == name)
        .count()
}
