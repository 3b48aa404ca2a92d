//! Ordered frontmatter parsing and serialization.
//!
//! Header blocks are `---`-delimited key/value pairs. Parsing keeps each
//! entry's original text so that reserializing an untouched document
//! reproduces the header byte-for-byte; only mutated or appended keys are
//! re-rendered. Appended keys always land at the end of the block.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use docforge_shared::{DocForgeError, FieldValue, Metadata, Result};

static KEY_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_.-]*):(.*)$").expect("valid regex"));

/// One line or line-group of the header block.
#[derive(Debug, Clone)]
enum Entry {
    /// A parsed key/value field. `raw` holds the exact original line(s)
    /// and is cleared when the value is replaced.
    Field {
        key: String,
        value: FieldValue,
        raw: Option<String>,
    },
    /// Blank line or `#` comment, reproduced verbatim.
    Passthrough(String),
}

/// An ordered, round-trip-preserving frontmatter block.
#[derive(Debug, Clone, Default)]
pub struct Frontmatter {
    entries: Vec<Entry>,
}

impl Frontmatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `text` into a parsed header and the byte-exact body remainder.
    ///
    /// A file that does not open with a `---` line has no header: the whole
    /// text is the body. An opening delimiter without a closing one, a
    /// duplicate key, or a line that is neither a field, list item, comment,
    /// nor blank is a [`DocForgeError::Parse`].
    pub fn parse<'a>(text: &'a str, path: &Path) -> Result<(Self, &'a str)> {
        if text != "---" && !text.starts_with("---\n") {
            return Ok((Self::new(), text));
        }

        let lines: Vec<&str> = text.split('\n').collect();
        let close = lines[1..]
            .iter()
            .position(|line| *line == "---")
            .map(|i| i + 1)
            .ok_or_else(|| DocForgeError::parse(path, "unterminated frontmatter block"))?;

        let entries = parse_entries(&lines[1..close], path)?;

        // Body starts after the closing delimiter's newline.
        let header_len: usize = lines[..=close].iter().map(|l| l.len() + 1).sum();
        let body = if header_len >= text.len() {
            ""
        } else {
            &text[header_len..]
        };

        Ok((Self { entries }, body))
    }

    pub fn is_empty(&self) -> bool {
        !self
            .entries
            .iter()
            .any(|e| matches!(e, Entry::Field { .. }))
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.entries.iter().find_map(|entry| match entry {
            Entry::Field { key: k, value, .. } if k == key => Some(value),
            _ => None,
        })
    }

    /// Insert or replace `key`. A replaced field keeps its position but is
    /// re-rendered canonically; a new field is appended at the end.
    pub fn set(&mut self, key: &str, value: FieldValue) {
        for entry in &mut self.entries {
            match entry {
                Entry::Field { key: k, value: v, raw } if k == key => {
                    if *v != value {
                        *v = value;
                        *raw = None;
                    }
                    return;
                }
                _ => {}
            }
        }
        self.entries.push(Entry::Field {
            key: key.to_string(),
            value,
            raw: None,
        });
    }

    /// Bring the header in line with `metadata`: every metadata entry is
    /// set (in metadata order), untouched existing fields keep their bytes.
    /// Header keys absent from `metadata` are left alone; this never
    /// removes a field.
    pub fn apply(&mut self, metadata: &Metadata) {
        for (key, value) in metadata.iter() {
            self.set(key, value.clone());
        }
    }

    /// Snapshot the fields as an ordered metadata map.
    pub fn to_metadata(&self) -> Metadata {
        self.entries
            .iter()
            .filter_map(|entry| match entry {
                Entry::Field { key, value, .. } => Some((key.clone(), value.clone())),
                Entry::Passthrough(_) => None,
            })
            .collect()
    }

    /// Render the header block, delimiters included. Empty frontmatter
    /// renders as an empty string so header-less documents stay header-less.
    pub fn serialize(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }

        let mut out = String::from("---\n");
        for entry in &self.entries {
            match entry {
                Entry::Field { raw: Some(raw), .. } => {
                    out.push_str(raw);
                    out.push('\n');
                }
                Entry::Field { key, value, raw: None } => {
                    out.push_str(&render_field(key, value));
                }
                Entry::Passthrough(line) => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
        out.push_str("---\n");
        out
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

fn parse_entries(lines: &[&str], path: &Path) -> Result<Vec<Entry>> {
    let mut entries: Vec<Entry> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            entries.push(Entry::Passthrough(line.to_string()));
            i += 1;
            continue;
        }

        let Some(caps) = KEY_LINE_RE.captures(line) else {
            return Err(DocForgeError::parse(
                path,
                format!("invalid frontmatter line: {line:?}"),
            ));
        };

        let key = caps[1].to_string();
        if entries.iter().any(
            |e| matches!(e, Entry::Field { key: k, .. } if *k == key),
        ) {
            return Err(DocForgeError::parse(
                path,
                format!("duplicate frontmatter key: {key}"),
            ));
        }

        let rest = caps[2].trim();
        let (value, raw, next) = if rest.is_empty() {
            parse_block_list(lines, i)
        } else if let Some(inner) = rest.strip_prefix('[').and_then(|r| r.strip_suffix(']')) {
            (
                FieldValue::List(split_inline_list(inner)),
                line.to_string(),
                i + 1,
            )
        } else {
            (FieldValue::Scalar(unquote(rest)), line.to_string(), i + 1)
        };

        entries.push(Entry::Field {
            key,
            value,
            raw: Some(raw),
        });
        i = next;
    }

    Ok(entries)
}

/// Parse `key:` followed by `- item` lines. A bare `key:` with no items is
/// an empty scalar.
fn parse_block_list(lines: &[&str], start: usize) -> (FieldValue, String, usize) {
    let mut items = Vec::new();
    let mut raw_lines = vec![lines[start].to_string()];
    let mut i = start + 1;

    while i < lines.len() {
        let trimmed = lines[i].trim_start();
        let Some(item) = trimmed.strip_prefix("- ") else {
            break;
        };
        items.push(unquote(item.trim()));
        raw_lines.push(lines[i].to_string());
        i += 1;
    }

    if items.is_empty() {
        (
            FieldValue::Scalar(String::new()),
            raw_lines.remove(0),
            start + 1,
        )
    } else {
        (FieldValue::List(items), raw_lines.join("\n"), i)
    }
}

/// Split an inline `[a, b, c]` interior on commas outside double quotes.
fn split_inline_list(inner: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in inner.chars() {
        match c {
            '\\' if in_quotes && !escaped => {
                escaped = true;
                current.push(c);
            }
            '"' if !escaped => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => {
                items.push(current.clone());
                current.clear();
                escaped = false;
            }
            _ => {
                escaped = false;
                current.push(c);
            }
        }
    }
    items.push(current);

    items
        .iter()
        .map(|item| unquote(item.trim()))
        .filter(|item| !item.is_empty())
        .collect()
}

/// Strip surrounding double quotes and unescape `\"` / `\\`.
fn unquote(s: &str) -> String {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        s[1..s.len() - 1].replace("\\\"", "\"").replace("\\\\", "\\")
    } else {
        s.to_string()
    }
}

// ---------------------------------------------------------------------------
// Rendering helpers
// ---------------------------------------------------------------------------

/// Canonical rendering for mutated or appended fields.
fn render_field(key: &str, value: &FieldValue) -> String {
    match value {
        FieldValue::Scalar(s) => format!("{key}: \"{}\"\n", escape_yaml_string(s)),
        FieldValue::List(items) => {
            let quoted: Vec<String> = items
                .iter()
                .map(|item| format!("\"{}\"", escape_yaml_string(item)))
                .collect();
            format!("{key}: [{}]\n", quoted.join(", "))
        }
    }
}

/// Escape special characters in a YAML string value.
fn escape_yaml_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> (Frontmatter, String) {
        let (fm, body) = Frontmatter::parse(text, Path::new("test.md")).expect("parse");
        (fm, body.to_string())
    }

    #[test]
    fn untouched_document_roundtrips_byte_for_byte() {
        let text = "---\ntitle: \"API Guide\"\nauthor: platform team\n# review before publish\ntags: [auth, \"rate limits\"]\nsteps:\n  - first\n  - second\n---\n\n# API Guide\n\nBody text here.\n";
        let (fm, body) = parse(text);
        assert_eq!(format!("{}{}", fm.serialize(), body), text);
    }

    #[test]
    fn missing_frontmatter_is_empty_header() {
        let text = "# Just a body\n\nNo header at all.\n";
        let (fm, body) = parse(text);
        assert!(fm.is_empty());
        assert_eq!(body, text);
        assert_eq!(fm.serialize(), "");
    }

    #[test]
    fn unterminated_header_is_parse_error() {
        let text = "---\ntitle: broken\n\nbody without closing delimiter\n";
        let err = Frontmatter::parse(text, Path::new("broken.md")).unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn duplicate_key_is_parse_error() {
        let text = "---\ntitle: one\ntitle: two\n---\nbody\n";
        let err = Frontmatter::parse(text, Path::new("dup.md")).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn garbage_line_is_parse_error() {
        let text = "---\ntitle: fine\n!!! not a field\n---\nbody\n";
        let err = Frontmatter::parse(text, Path::new("bad.md")).unwrap_err();
        assert!(err.to_string().contains("invalid frontmatter line"));
    }

    #[test]
    fn scalar_values_unquote() {
        let (fm, _) = parse("---\ntitle: \"Quoted \\\"Title\\\"\"\nplain: bare value\n---\n");
        assert_eq!(
            fm.get("title").and_then(FieldValue::as_scalar),
            Some("Quoted \"Title\"")
        );
        assert_eq!(
            fm.get("plain").and_then(FieldValue::as_scalar),
            Some("bare value")
        );
    }

    #[test]
    fn inline_list_respects_quoted_commas() {
        let (fm, _) = parse("---\ntags: [alpha, \"beta, gamma\", delta]\n---\n");
        let items = fm.get("tags").and_then(FieldValue::as_list).expect("list");
        assert_eq!(items, ["alpha", "beta, gamma", "delta"]);
    }

    #[test]
    fn block_list_parses() {
        let (fm, _) = parse("---\nkeywords:\n  - tokens\n  - sessions\n---\n");
        let items = fm
            .get("keywords")
            .and_then(FieldValue::as_list)
            .expect("list");
        assert_eq!(items, ["tokens", "sessions"]);
    }

    #[test]
    fn bare_key_is_empty_scalar() {
        let (fm, _) = parse("---\nsummary:\ntitle: t\n---\n");
        assert_eq!(fm.get("summary").and_then(FieldValue::as_scalar), Some(""));
    }

    #[test]
    fn appended_keys_land_at_the_end() {
        let text = "---\ntitle: original\nauthor: someone\n---\nbody\n";
        let (mut fm, body) = parse(text);
        fm.set("keywords", FieldValue::List(vec!["auth".into()]));

        let out = format!("{}{}", fm.serialize(), body);
        assert_eq!(
            out,
            "---\ntitle: original\nauthor: someone\nkeywords: [\"auth\"]\n---\nbody\n"
        );
    }

    #[test]
    fn mutated_key_rerenders_in_place() {
        let text = "---\ntitle: original\nauthor: someone\n---\nbody\n";
        let (mut fm, _) = parse(text);
        fm.set("title", FieldValue::Scalar("updated".into()));

        let out = fm.serialize();
        assert_eq!(out, "---\ntitle: \"updated\"\nauthor: someone\n---\n");
    }

    #[test]
    fn setting_equal_value_keeps_original_bytes() {
        let text = "---\ntitle: bare title\n---\nbody\n";
        let (mut fm, _) = parse(text);
        // Same value: the unquoted original line must survive.
        fm.set("title", FieldValue::Scalar("bare title".into()));
        assert_eq!(fm.serialize(), "---\ntitle: bare title\n---\n");
    }

    #[test]
    fn apply_merges_metadata_in_order() {
        let text = "---\ntitle: t\n---\nbody\n";
        let (mut fm, _) = parse(text);

        let mut metadata = fm.to_metadata();
        metadata.insert("description", "a guide");
        metadata.insert("tags", vec!["auth".to_string(), "security".to_string()]);
        fm.apply(&metadata);

        let out = fm.serialize();
        let desc_pos = out.find("description").expect("description present");
        let tags_pos = out.find("tags").expect("tags present");
        assert!(desc_pos < tags_pos);
        assert!(out.starts_with("---\ntitle: t\n"));
    }

    #[test]
    fn header_only_file_has_empty_body() {
        let (fm, body) = parse("---\ntitle: t\n---");
        assert_eq!(fm.get("title").and_then(FieldValue::as_scalar), Some("t"));
        assert_eq!(body, "");
    }
}
