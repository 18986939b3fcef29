//! Content lines shared by iCalendar (RFC 5545 §3.1) and vCard (RFC 6350 §3.2).
//!
//! A content line is `NAME;PARAM=VALUE:value`, folded at 75 octets with a leading space
//! on continuation lines.

/// One unfolded content line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    /// Property name without group prefix, uppercased
    pub name: String,
    /// Group prefix (`item1` in `item1.EMAIL`), kept verbatim
    pub group: Option<String>,
    pub params: Vec<(String, String)>,
    /// Raw (still escaped) value
    pub value: String,
}

impl ContentLine {
    pub fn new(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_ascii_uppercase(),
            group: None,
            params: Vec::new(),
            value: value.into(),
        }
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params
            .push((key.to_ascii_uppercase(), value.to_string()));
        self
    }

    /// Parse an unfolded line. Returns `None` when there is no `:` separator.
    pub fn parse(line: &str) -> Option<Self> {
        let colon = find_value_separator(line)?;
        let (head, value) = (&line[..colon], &line[colon + 1..]);

        let mut parts = split_unquoted(head, ';').into_iter();
        let full_name = parts.next()?.trim();
        if full_name.is_empty() {
            return None;
        }
        let (group, name) = match full_name.rsplit_once('.') {
            Some((g, n)) => (Some(g.to_string()), n),
            None => (None, full_name),
        };

        let params = parts
            .map(|p| {
                let (k, v) = p.split_once('=').unwrap_or((p, ""));
                (k.trim().to_ascii_uppercase(), v.trim_matches('"').to_string())
            })
            .collect();

        Some(Self {
            name: name.to_ascii_uppercase(),
            group,
            params,
            value: value.to_string(),
        })
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Render without folding.
    pub fn to_line(&self) -> String {
        let mut out = String::new();
        if let Some(group) = &self.group {
            out.push_str(group);
            out.push('.');
        }
        out.push_str(&self.name);
        for (k, v) in &self.params {
            out.push(';');
            out.push_str(k);
            if !v.is_empty() {
                out.push('=');
                if v.contains([':', ';', ',']) {
                    out.push('"');
                    out.push_str(v);
                    out.push('"');
                } else {
                    out.push_str(v);
                }
            }
        }
        out.push(':');
        out.push_str(&self.value);
        out
    }

    /// Render folded at 75 octets, without the trailing CRLF.
    pub fn to_folded(&self) -> String {
        fold(&self.to_line())
    }
}

/// The `:` that ends the name/parameter section, skipping quoted parameter values.
fn find_value_separator(line: &str) -> Option<usize> {
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ':' if !quoted => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if c == sep && !quoted {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Join folded continuation lines. Accepts CRLF or bare LF.
pub fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.split('\n') {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let Some(rest) = raw.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        if !raw.is_empty() {
            lines.push(raw.to_string());
        }
    }
    lines
}

/// Fold a line at 75 octets without splitting UTF-8 sequences.
pub fn fold(line: &str) -> String {
    const LIMIT: usize = 75;
    if line.len() <= LIMIT {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len() + line.len() / LIMIT * 3);
    let mut width = 0;
    for c in line.chars() {
        let len = c.len_utf8();
        if width + len > LIMIT {
            out.push_str("\r\n ");
            width = 1;
        }
        out.push(c);
        width += len;
    }
    out
}

/// Escape a TEXT value.
pub fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Unescape a TEXT value.
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split a structured value on unescaped `sep` (used for `N`, `ADR`, `ORG`).
pub fn split_structured(value: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for c in value.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == sep {
            parts.push(unescape_text(&current));
            current.clear();
        } else {
            current.push(c);
        }
    }
    parts.push(unescape_text(&current));
    parts
}

/// Serialize lines with CRLF endings.
pub fn render(lines: &[ContentLine]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(&line.to_folded());
        out.push_str("\r\n");
    }
    out
}
