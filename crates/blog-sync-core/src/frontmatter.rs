//! Metadata block codec for staged markdown files.
//!
//! A metadata block opens with a `---` line at the very start of the file
//! and closes with the next `---` line. Each line inside is `key: value`.
//! Values may be bare, double-quoted (JSON escapes), single-quoted, `true` /
//! `false`, or an inline `["a", "b"]` list; `tags` also accepts an indented
//! `- item` list on the following lines. Unknown keys are ignored.

use chrono::{DateTime, NaiveDate, Utc};

/// Line that opens and closes a metadata block.
pub const DELIMITER: &str = "---";

/// Known metadata fields. Absent fields fall back to extraction or defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub date: Option<String>,
    pub excerpt: Option<String>,
    pub post_type: Option<String>,
    pub published: Option<bool>,
    pub tags: Vec<String>,
}

impl FrontMatter {
    /// Parse `date` as `YYYY-MM-DD` (midnight UTC) or RFC 3339.
    pub fn date_utc(&self) -> Option<DateTime<Utc>> {
        let raw = self.date.as_deref()?.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    /// Render as a metadata block, including the trailing newline.
    pub fn render(&self) -> String {
        let mut lines = vec![DELIMITER.to_string()];
        if let Some(title) = &self.title {
            lines.push(format!("title: {}", quote(title)));
        }
        if let Some(date) = &self.date {
            lines.push(format!("date: {}", quote(date)));
        }
        if let Some(excerpt) = &self.excerpt {
            lines.push(format!("excerpt: {}", quote(excerpt)));
        }
        if let Some(post_type) = &self.post_type {
            lines.push(format!("type: {}", quote(post_type)));
        }
        if let Some(published) = self.published {
            lines.push(format!("published: {}", published));
        }
        if !self.tags.is_empty() {
            let quoted: Vec<String> = self.tags.iter().map(|t| quote(t)).collect();
            lines.push(format!("tags: [{}]", quoted.join(", ")));
        }
        lines.push(DELIMITER.to_string());
        lines.push(String::new());
        lines.join("\n")
    }
}

/// A staged file split into its metadata block and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument<'a> {
    pub front_matter: Option<FrontMatter>,
    pub body: &'a str,
}

/// True when the content already starts with a metadata delimiter.
///
/// The exporter uses this to avoid prepending a second block.
pub fn has_front_matter(content: &str) -> bool {
    content.trim_start_matches('\u{feff}').starts_with(DELIMITER)
}

/// Split `content` into metadata and body.
///
/// Content without an opening delimiter, or with an opening delimiter that
/// is never closed, is returned whole as the body.
pub fn parse(content: &str) -> ParsedDocument<'_> {
    let text = content.trim_start_matches('\u{feff}');
    let no_block = ParsedDocument {
        front_matter: None,
        body: text,
    };

    let mut lines = text.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == DELIMITER => {}
        _ => return no_block,
    }

    let mut offset = text.find('\n').map(|i| i + 1).unwrap_or(text.len());
    let mut block: Vec<&str> = Vec::new();
    for line in lines {
        offset += line.len();
        if line.trim_end() == DELIMITER {
            return ParsedDocument {
                front_matter: Some(parse_block(&block)),
                body: &text[offset..],
            };
        }
        block.push(line.trim_end_matches(['\n', '\r']));
    }

    no_block
}

fn parse_block(lines: &[&str]) -> FrontMatter {
    let mut fm = FrontMatter::default();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        i += 1;
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        let key = key.trim();
        let value = value.trim();

        match key {
            "title" => fm.title = non_empty(unquote(value)),
            "date" => fm.date = non_empty(unquote(value)),
            "excerpt" => fm.excerpt = non_empty(unquote(value)),
            "type" => fm.post_type = non_empty(unquote(value)),
            "published" => fm.published = parse_bool(value),
            "tags" => {
                if value.is_empty() {
                    while i < lines.len() {
                        let Some(item) = lines[i].trim_start().strip_prefix("- ") else {
                            break;
                        };
                        if let Some(tag) = non_empty(unquote(item.trim())) {
                            fm.tags.push(tag);
                        }
                        i += 1;
                    }
                } else {
                    fm.tags = parse_list(value);
                }
            }
            _ => {}
        }
    }
    fm
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        if let Ok(s) = serde_json::from_str::<String>(value) {
            return s;
        }
        return value[1..value.len() - 1].to_string();
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].replace("''", "'");
    }
    value.to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match unquote(value).as_str() {
        "true" | "yes" => Some(true),
        "false" | "no" => Some(false),
        _ => None,
    }
}

fn parse_list(value: &str) -> Vec<String> {
    if let Ok(items) = serde_json::from_str::<Vec<String>>(value) {
        return items.into_iter().filter(|t| !t.trim().is_empty()).collect();
    }
    let inner = value
        .strip_prefix('[')
        .and_then(|v| v.strip_suffix(']'))
        .unwrap_or(value);
    inner
        .split(',')
        .filter_map(|item| non_empty(unquote(item.trim())))
        .collect()
}
