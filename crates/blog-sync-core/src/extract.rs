//! Title and excerpt recovery from raw markdown bodies.
//!
//! Used when a staged document carries no explicit `title` or `excerpt` in
//! its metadata block, and by the exporter when it synthesizes one.

/// Title used when a document has no level-1 heading.
pub const FALLBACK_TITLE: &str = "飞书文档";

/// Maximum excerpt length in characters before truncation.
pub const EXCERPT_MAX_CHARS: usize = 200;

/// Appended to truncated excerpts.
pub const ELLIPSIS: &str = "...";

/// Return the text of the first `# ` heading, or [`FALLBACK_TITLE`].
///
/// Only a single `#` followed by a space counts; `## Sub` does not.
pub fn extract_title(content: &str) -> String {
    content
        .lines()
        .find_map(h1_text)
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_TITLE.to_string())
}

/// Return the first non-empty paragraph after the first `#` heading line,
/// stripped of leading markup and truncated to [`EXCERPT_MAX_CHARS`].
pub fn extract_excerpt(content: &str) -> String {
    let without_title = remove_first_heading(content);

    for paragraph in paragraphs(without_title.trim()) {
        let cleaned = strip_leading_markup(paragraph.trim());
        if cleaned.is_empty() {
            continue;
        }
        return truncate(cleaned);
    }

    String::new()
}

fn h1_text(line: &str) -> Option<&str> {
    let text = line.strip_prefix("# ")?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Drop the first line that reads as `#<whitespace><text>`.
fn remove_first_heading(content: &str) -> String {
    let mut removed = false;
    let mut out = String::with_capacity(content.len());
    for line in content.split_inclusive('\n') {
        if !removed && is_heading_line(line.trim_end_matches(['\n', '\r'])) {
            removed = true;
            // Keep the line break so surrounding paragraphs stay separated.
            if line.ends_with('\n') {
                out.push('\n');
            }
            continue;
        }
        out.push_str(line);
    }
    out
}

fn is_heading_line(line: &str) -> bool {
    match line.strip_prefix('#') {
        Some(rest) => {
            rest.starts_with(char::is_whitespace) && !rest.trim().is_empty()
        }
        None => false,
    }
}

/// Split on blank-line boundaries (lines holding only whitespace).
fn paragraphs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}

fn strip_leading_markup(paragraph: &str) -> &str {
    paragraph
        .trim_start_matches(['#', '-', '*', '>'])
        .trim_start()
}

fn truncate(text: &str) -> String {
    if text.chars().count() > EXCERPT_MAX_CHARS {
        let mut cut: String = text.chars().take(EXCERPT_MAX_CHARS).collect();
        cut.push_str(ELLIPSIS);
        cut
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_from_first_h1() {
        let md = "intro\n\n#not-this\n# Alpha \n\n# Beta\n";
        assert_eq!(extract_title(md), "Alpha");
    }

    #[test]
    fn title_ignores_deeper_headings() {
        assert_eq!(extract_title("## Section\n\ntext"), FALLBACK_TITLE);
    }

    #[test]
    fn title_fallback_on_empty_input() {
        assert_eq!(extract_title(""), FALLBACK_TITLE);
        assert_eq!(extract_title("# \n\nbody"), FALLBACK_TITLE);
    }

    #[test]
    fn title_handles_crlf() {
        assert_eq!(extract_title("# Windows\r\n\r\nbody"), "Windows");
    }

    #[test]
    fn excerpt_skips_heading_and_blank_paragraphs() {
        let md = "# Alpha\n\n   \n\nHello world.\n\nSecond paragraph.";
        assert_eq!(extract_excerpt(md), "Hello world.");
    }

    #[test]
    fn excerpt_strips_leading_markup() {
        assert_eq!(extract_excerpt("# T\n\n> quoted"), "quoted");
        // Only the first run of markup characters is removed.
        assert_eq!(extract_excerpt("# T\n\n> - item"), "- item");
        assert_eq!(extract_excerpt("# T\n\n## Sub heading\n\nmore"), "Sub heading");
        assert_eq!(extract_excerpt("# T\n\n***\n\nreal"), "real");
    }

    #[test]
    fn excerpt_keeps_multiline_paragraph() {
        assert_eq!(extract_excerpt("line one\nline two\n\nnext"), "line one\nline two");
    }

    #[test]
    fn excerpt_truncates_to_limit_plus_ellipsis() {
        let long = "x".repeat(250);
        let md = format!("# Title\n\n{}", long);
        let excerpt = extract_excerpt(&md);
        assert_eq!(excerpt.chars().count(), EXCERPT_MAX_CHARS + ELLIPSIS.len());
        assert!(excerpt.ends_with(ELLIPSIS));
    }

    #[test]
    fn excerpt_counts_characters_not_bytes() {
        let long = "飞".repeat(201);
        let excerpt = extract_excerpt(&long);
        assert_eq!(excerpt.chars().count(), 203);
        assert!(excerpt.starts_with(&"飞".repeat(200)));
    }

    #[test]
    fn excerpt_at_limit_is_untouched() {
        let exact = "y".repeat(EXCERPT_MAX_CHARS);
        assert_eq!(extract_excerpt(&exact), exact);
    }

    #[test]
    fn excerpt_empty_when_only_heading() {
        assert_eq!(extract_excerpt("# Only a title\n"), "");
        assert_eq!(extract_excerpt(""), "");
    }
}
