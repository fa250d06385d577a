//! Text-to-structure parser: a single pass over a fixed-layout TXT novel
//! producing a [`Book`] of volumes and chapters.
//!
//! The first non-blank line is the title; a `作者：` line sets the author;
//! volume/chapter/extra heading lines open tree nodes; everything else is
//! paragraph text for the chapter currently open.

use crate::model::{html_paragraph, Book, Chapter, Volume};
use regex::Regex;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

pub const TITLE_PATTERN: &str = r"^\S+.*$";
pub const AUTHOR_PATTERN: &str = r"^作者[:：](.*)$";
pub const INTRO_PATTERN: &str = r"^(内容简介|简介|楔子|引子|序|序言)$";
pub const VOLUME_PATTERN: &str = r"^(第[一二三四五六七八九十百零0-9]+(卷|部|集)).{0,30}$";
pub const CHAPTER_PATTERN: &str =
    r"^((第[一二三四五六七八九十百千万零0-9]+(章|回|节))|(完本感言)).{0,40}$";
pub const EXTRA_PATTERN: &str = r"^番外.{0,30}$";

fn compiled(pattern: &str) -> Regex {
    Regex::new(pattern).expect("default pattern must compile")
}

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| compiled(TITLE_PATTERN));
static AUTHOR_RE: LazyLock<Regex> = LazyLock::new(|| compiled(AUTHOR_PATTERN));
static INTRO_RE: LazyLock<Regex> = LazyLock::new(|| compiled(INTRO_PATTERN));
static VOLUME_RE: LazyLock<Regex> = LazyLock::new(|| compiled(VOLUME_PATTERN));
static CHAPTER_RE: LazyLock<Regex> = LazyLock::new(|| compiled(CHAPTER_PATTERN));
static EXTRA_RE: LazyLock<Regex> = LazyLock::new(|| compiled(EXTRA_PATTERN));

#[derive(Debug, Error)]
pub enum TextParseError {
    #[error("TXT file path must not be empty")]
    EmptyPath,

    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The four runtime-overridable heading patterns. Unset overrides keep the
/// defaults.
#[derive(Debug, Clone)]
pub struct ParsePatterns {
    pub volume: Regex,
    pub chapter: Regex,
    pub extra: Regex,
    pub intro: Regex,
}

impl Default for ParsePatterns {
    fn default() -> Self {
        Self {
            volume: VOLUME_RE.clone(),
            chapter: CHAPTER_RE.clone(),
            extra: EXTRA_RE.clone(),
            intro: INTRO_RE.clone(),
        }
    }
}

/// Parse a UTF-8 TXT file into a [`Book`].
pub fn parse_file(path: &Path, patterns: &ParsePatterns) -> Result<Book, TextParseError> {
    if path.as_os_str().is_empty() {
        return Err(TextParseError::EmptyPath);
    }
    let file = std::fs::File::open(path).map_err(|e| TextParseError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_reader(std::io::BufReader::new(file), patterns).map_err(|e| match e {
        TextParseError::Io { source, .. } => TextParseError::Io {
            path: path.to_path_buf(),
            source,
        },
        other => other,
    })
}

/// Parse any line source. Lines are trimmed; blank lines are skipped.
pub fn parse_reader<R: BufRead>(
    reader: R,
    patterns: &ParsePatterns,
) -> Result<Book, TextParseError> {
    let mut book = Book::default();
    let mut current_vol: Option<Volume> = None;
    let mut current_ch: Option<Chapter> = None;

    for line in reader.lines() {
        let line = line.map_err(|e| TextParseError::Io {
            path: PathBuf::new(),
            source: e,
        })?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // The first non-blank line is always the title.
        if book.name.is_empty() && TITLE_RE.is_match(line) {
            book.name = line.to_string();
            continue;
        }

        if book.author.is_empty() {
            if let Some(captures) = AUTHOR_RE.captures(line) {
                book.author = captures
                    .get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                continue;
            }
        }

        if patterns.volume.is_match(line) {
            flush_chapter(&mut current_vol, &mut current_ch);
            flush_volume(&mut book, &mut current_vol);
            current_vol = Some(Volume {
                title: line.to_string(),
                chapters: Vec::new(),
            });
            continue;
        }

        if patterns.chapter.is_match(line) {
            if current_vol.is_none() {
                current_vol = Some(Volume::default());
            }
            flush_chapter(&mut current_vol, &mut current_ch);
            current_ch = Some(Chapter {
                title: line.to_string(),
                ..Chapter::default()
            });
            continue;
        }

        if patterns.extra.is_match(line) {
            flush_chapter(&mut current_vol, &mut current_ch);
            if current_vol.is_none() {
                current_vol = Some(Volume {
                    title: "番外".to_string(),
                    chapters: Vec::new(),
                });
            }
            current_ch = Some(Chapter {
                title: line.to_string(),
                ..Chapter::default()
            });
            continue;
        }

        if is_special_heading(line) {
            if current_vol.is_none() {
                current_vol = Some(Volume::default());
            }
            flush_chapter(&mut current_vol, &mut current_ch);
            current_ch = Some(Chapter {
                title: line.to_string(),
                ..Chapter::default()
            });
            continue;
        }

        if let Some(chapter) = current_ch.as_mut() {
            chapter.content.push_str(&html_paragraph(line));
        }
        // Prose with no open chapter is dropped; the assembler recovers the
        // book description from the first chapter when applicable.
    }

    flush_chapter(&mut current_vol, &mut current_ch);
    flush_volume(&mut book, &mut current_vol);
    Ok(book)
}

/// Headings that open a chapter without matching the chapter pattern.
fn is_special_heading(line: &str) -> bool {
    matches!(line, "楔子" | "卷首语" | "序" | "楔子语")
        || line.starts_with("简介")
        || line.starts_with("内容简介")
}

fn flush_chapter(vol: &mut Option<Volume>, ch: &mut Option<Chapter>) {
    if let Some(chapter) = ch.take() {
        if let Some(volume) = vol.as_mut() {
            volume.chapters.push(chapter);
        }
    }
}

fn flush_volume(book: &mut Book, vol: &mut Option<Volume>) {
    if let Some(volume) = vol.take() {
        book.volumes.push(volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Book {
        parse_reader(Cursor::new(text), &ParsePatterns::default()).unwrap()
    }

    const MINIMAL: &str = "我的小说\n作者：某某\n第一章 开始\n第一段\n第二段\n第二章 结束\n结局\n";

    #[test]
    fn minimal_text_yields_title_author_and_two_chapters() {
        let book = parse(MINIMAL);
        assert_eq!(book.name, "我的小说");
        assert_eq!(book.author, "某某");
        assert_eq!(book.volumes.len(), 1);
        assert!(book.volumes[0].title.is_empty());
        let chapters = &book.volumes[0].chapters;
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "第一章 开始");
        assert_eq!(chapters[0].content.matches("<p ").count(), 2);
        assert_eq!(chapters[1].title, "第二章 结束");
        assert_eq!(chapters[1].content.matches("<p ").count(), 1);
    }

    #[test]
    fn reparsing_is_structurally_equal() {
        assert_eq!(parse(MINIMAL), parse(MINIMAL));
    }

    #[test]
    fn paragraphs_are_escaped_and_wrapped() {
        let book = parse("书\n作者：人\n第一章 甲\na < b > c\n");
        let content = &book.volumes[0].chapters[0].content;
        assert_eq!(
            content,
            "<p style=\"text-indent:2em\">a &lt; b &gt; c</p>\n"
        );
        let inner = content
            .trim_start_matches("<p style=\"text-indent:2em\">")
            .trim_end_matches("</p>\n");
        assert!(!inner.contains('<') && !inner.contains('>'));
    }

    #[test]
    fn volume_markers_split_the_tree_in_source_order() {
        let text = "书\n作者：人\n楔子\n引言内容\n第一卷 开端\n第一章 甲\n内容一\n第二章 乙\n内容二\n番外 花絮\n花絮内容\n";
        let book = parse(text);
        assert_eq!(book.volumes.len(), 2);
        assert!(book.volumes[0].title.is_empty());
        assert_eq!(book.volumes[0].chapters.len(), 1);
        assert_eq!(book.volumes[0].chapters[0].title, "楔子");
        assert_eq!(book.volumes[1].title, "第一卷 开端");
        let titles: Vec<_> = book.volumes[1]
            .chapters
            .iter()
            .map(|c| c.title.as_str())
            .collect();
        // 番外 with a volume already open becomes a chapter of that volume.
        assert_eq!(titles, vec!["第一章 甲", "第二章 乙", "番外 花絮"]);
    }

    #[test]
    fn extra_without_open_volume_opens_one_named_extra() {
        let text = "书\n作者：人\n番外 某个故事\n正文\n";
        let book = parse(text);
        assert_eq!(book.volumes.len(), 1);
        assert_eq!(book.volumes[0].title, "番外");
        assert_eq!(book.volumes[0].chapters[0].title, "番外 某个故事");
    }

    #[test]
    fn prose_before_first_chapter_is_dropped_from_tree() {
        let text = "书\n作者：人\n这是一段前言。\n又一段。\n第一章 甲\n正文\n";
        let book = parse(text);
        assert_eq!(book.volumes.len(), 1);
        assert_eq!(book.volumes[0].chapters.len(), 1);
        assert_eq!(
            book.volumes[0].chapters[0].content,
            "<p style=\"text-indent:2em\">正文</p>\n"
        );
    }

    #[test]
    fn special_headings_open_chapters() {
        let text = "书\n作者：人\n序\n开场白\n第一章 甲\n正文\n";
        let book = parse(text);
        let chapters = &book.volumes[0].chapters;
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "序");
        assert!(chapters[0].content.contains("开场白"));
    }

    #[test]
    fn chapter_variants_match_default_pattern() {
        for heading in ["第十回 返乡", "第3节 某节", "完本感言", "第一千零一章 结尾"] {
            assert!(CHAPTER_RE.is_match(heading), "unmatched: {heading}");
        }
        assert!(!CHAPTER_RE.is_match("普通段落文字"));
    }

    #[test]
    fn override_matching_nothing_leaves_volume_empty() {
        let text = "书\n作者：人\n第一卷 开端\n第一章 甲\n正文被丢弃\n";
        let patterns = ParsePatterns {
            chapter: Regex::new(r"^此模式不匹配任何行$").unwrap(),
            ..ParsePatterns::default()
        };
        let book = parse_reader(Cursor::new(text), &patterns).unwrap();
        assert_eq!(book.volumes.len(), 1);
        assert!(book.volumes[0].chapters.is_empty());
    }

    #[test]
    fn chapter_order_matches_source_order() {
        let mut text = String::from("书\n作者：人\n");
        for i in 1..=9 {
            text.push_str(&format!("第{i}章 标题{i}\n内容{i}\n"));
        }
        let book = parse(&text);
        let titles: Vec<_> = book.volumes[0]
            .chapters
            .iter()
            .map(|c| c.title.clone())
            .collect();
        let expected: Vec<_> = (1..=9).map(|i| format!("第{i}章 标题{i}")).collect();
        assert_eq!(titles, expected);
    }

    #[test]
    fn author_line_with_ascii_colon_is_accepted() {
        let book = parse("书\n作者:张三\n第一章 甲\n正文\n");
        assert_eq!(book.author, "张三");
    }

    #[test]
    fn parse_file_rejects_empty_path() {
        let result = parse_file(Path::new(""), &ParsePatterns::default());
        assert!(matches!(result, Err(TextParseError::EmptyPath)));
    }

    #[test]
    fn parse_file_reports_missing_file() {
        let result = parse_file(
            Path::new("/nonexistent/cnovel/book.txt"),
            &ParsePatterns::default(),
        );
        assert!(matches!(result, Err(TextParseError::Io { .. })));
    }

    #[test]
    fn parse_file_reads_from_disk() {
        let path = std::env::temp_dir().join("cnovel_parser_roundtrip.txt");
        std::fs::write(&path, MINIMAL).unwrap();
        let book = parse_file(&path, &ParsePatterns::default()).unwrap();
        assert_eq!(book.name, "我的小说");
        assert_eq!(book.volumes[0].chapters.len(), 2);
        std::fs::remove_file(&path).ok();
    }
}
