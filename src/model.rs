//! Canonical data model for a converted novel.
//!
//! Both pipelines (text parser and spider) produce this tree; the EPUB
//! assembler and the plain-text writer consume it read-only.

/// Language used when nothing else is configured or crawled.
pub const DEFAULT_LANG: &str = "zh-CN";

/// One novel: metadata plus an ordered list of volumes.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub name: String,
    pub author: String,
    /// Source URL when crawled; empty for local files.
    pub url: String,
    /// Name of the crawl rule used; empty for local files.
    pub rule_name: String,
    pub volumes: Vec<Volume>,
    /// Cover reference: local path or URL. Empty means no cover.
    pub cover: String,
    pub lang: String,
    pub intro: String,
    pub publisher: String,
    pub publish_date: String,
}

impl Default for Book {
    fn default() -> Self {
        Self {
            name: String::new(),
            author: String::new(),
            url: String::new(),
            rule_name: String::new(),
            volumes: Vec::new(),
            cover: String::new(),
            lang: DEFAULT_LANG.to_string(),
            intro: String::new(),
            publisher: String::new(),
            publish_date: String::new(),
        }
    }
}

impl Book {
    /// Plain-text projection: `title`, blank line, content, blank line, per
    /// chapter in reading order. HTML paragraph markup is stripped.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for vol in &self.volumes {
            for ch in &vol.chapters {
                out.push_str(&ch.title);
                out.push_str("\n\n");
                out.push_str(strip_tags(&ch.content).trim_end());
                out.push_str("\n\n");
            }
        }
        out
    }
}

/// Ordered grouping of chapters. An empty title marks the implicit volume
/// used when the source has no volume markers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Volume {
    pub title: String,
    pub chapters: Vec<Chapter>,
}

/// A leaf unit: heading line plus paragraph body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chapter {
    pub title: String,
    /// HTML fragment of wrapped paragraphs only, no headings.
    pub content: String,
    /// Source page URL; empty when parsed from a local file.
    pub url: String,
}

/// Wrap one source line as an indented paragraph, escaping angle brackets so
/// the content never carries raw markup.
pub fn html_paragraph(line: &str) -> String {
    let escaped = line.replace('<', "&lt;").replace('>', "&gt;");
    format!("<p style=\"text-indent:2em\">{}</p>\n", escaped)
}

/// Remove `<...>` tag runs from an HTML fragment, keeping text content.
pub fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}
