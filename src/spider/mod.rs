//! Rule-driven crawling: metadata, paginated catalog, and paginated chapter
//! content, orchestrated into a [`Book`] by [`crawl_book`].

pub mod client;
pub mod selector;

use crate::model::{html_paragraph, Book, Chapter, Volume, DEFAULT_LANG};
use crate::rules::{ChapterRule, ContentRule, MetadataRule, RuleSet, Selector};
use client::{FetchError, Fetcher};
use ego_tree::NodeRef;
use reqwest::Url;
use scraper::{Html, Node};
use selector::{select_elements, select_href, select_value, SelectorError};
use thiserror::Error;

/// Prefix for chapter bodies replaced by a crawl failure under `skip_err`.
pub const CONTENT_ERROR_PREFIX: &str = "小说内容抓取错误：";

#[derive(Debug, Error)]
pub enum SpiderError {
    #[error("No crawl rule found for: {0}")]
    UnknownRule(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Metadata lifted from a site's book page.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub name: String,
    pub author: String,
    pub category: String,
    pub url: String,
    pub cover: String,
    pub lang: String,
    pub intro: String,
    pub publisher: String,
    pub publish_date: String,
}

/// One catalog entry: chapter title, absolute page URL, and the running
/// zero-based index across all catalog pages.
#[derive(Debug, Clone, PartialEq)]
pub struct Catalog {
    pub title: String,
    pub url: String,
    pub index: usize,
}

/// Parameters for a full crawl. `start_chapter`/`end_chapter` are inclusive
/// bounds on the catalog index; 0 means unbounded.
pub struct CrawlOptions<'a> {
    pub url: String,
    pub rule_name: String,
    pub start_chapter: i64,
    pub end_chapter: i64,
    pub progress: Option<&'a dyn Fn(usize, usize)>,
}

/// Fetch the book page once and apply the five metadata selectors. Language
/// is fixed; publisher and publish date are not crawled.
pub fn crawl_metadata(
    fetcher: &Fetcher,
    url: &str,
    rule: &MetadataRule,
) -> Result<Metadata, SpiderError> {
    let response = fetcher.get(url)?;
    let doc = Html::parse_document(&response.text());
    let field = |sel: &Selector| select_value(&doc, std::slice::from_ref(sel));
    Ok(Metadata {
        name: field(&rule.name_regexp)?,
        author: field(&rule.author_regexp)?,
        category: field(&rule.category_regexp)?,
        url: url.to_string(),
        cover: field(&rule.cover_regexp)?,
        lang: DEFAULT_LANG.to_string(),
        intro: field(&rule.intro_regexp)?,
        publisher: String::new(),
        publish_date: String::new(),
    })
}

/// Walk the catalog starting at `url`, following pagination when enabled.
/// Entries keep discovery order; the index is monotonic across pages. A page
/// fetch failure is fatal to the whole catalog.
pub fn crawl_catalog(
    fetcher: &Fetcher,
    url: &str,
    rule: &ChapterRule,
) -> Result<Vec<Catalog>, SpiderError> {
    let mut catalogs: Vec<Catalog> = Vec::new();
    let mut page_url = url.to_string();
    loop {
        let response = fetcher.get(&page_url)?;
        let doc = Html::parse_document(&response.text());

        for anchor in select_elements(&doc, &rule.catalog_regexp)? {
            let href = anchor.value().attr("href").unwrap_or_default();
            let absolute = resolve_url(&page_url, href)?;
            let title = anchor.text().collect::<String>().trim().to_string();
            catalogs.push(Catalog {
                title,
                url: absolute,
                index: catalogs.len(),
            });
        }

        if !rule.is_pagination {
            break;
        }
        let next = next_page_url(&doc, &rule.pagination_regexp, &page_url)?;
        if next.is_empty() || next == page_url {
            break;
        }
        page_url = next;
    }
    Ok(catalogs)
}

/// Fetch a chapter body starting at `url`, concatenating pages until the
/// pagination chain runs out or points at the end-text marker. Text nodes are
/// walked in document order; subtrees of filtered tags are dropped and the
/// configured substrings removed.
pub fn crawl_content(
    fetcher: &Fetcher,
    url: &str,
    rule: &ContentRule,
) -> Result<String, SpiderError> {
    let mut buf = String::new();
    let mut page_url = url.to_string();
    loop {
        let next = crawl_content_page(fetcher, &page_url, rule, &mut buf)?;
        if next.is_empty() || next == page_url {
            return Ok(buf);
        }
        if rule.wait_time > 0 {
            std::thread::sleep(std::time::Duration::from_micros(rule.wait_time));
        }
        page_url = next;
    }
}

/// One content page: append its text to `buf` and return the next page URL,
/// empty when the run ends.
fn crawl_content_page(
    fetcher: &Fetcher,
    url: &str,
    rule: &ContentRule,
    buf: &mut String,
) -> Result<String, SpiderError> {
    let response = fetcher.get(url)?;
    let doc = Html::parse_document(&response.text());

    for element in select_elements(&doc, &rule.content_regexp)? {
        collect_text(*element, &rule.filter_html, &rule.filter_text, buf);
    }

    if !rule.is_pagination {
        return Ok(String::new());
    }
    let pagers = select_elements(&doc, &rule.pagination_regexp.selector_group)?;
    let Some(pager) = pagers.first() else {
        return Ok(String::new());
    };
    let text = pager.text().collect::<String>().trim().to_string();
    let end_text = &rule.pagination_regexp.end_text;
    if !text.is_empty() && !end_text.is_empty() && end_text.contains(text.as_str()) {
        return Ok(String::new());
    }
    let attr = rule
        .pagination_regexp
        .selector_group
        .last()
        .map(|s| s.attr.as_str())
        .filter(|a| !a.is_empty())
        .unwrap_or("href");
    let href = pager.value().attr(attr).unwrap_or_default().trim();
    if href.is_empty() {
        return Ok(String::new());
    }
    Ok(resolve_url(url, href).unwrap_or_default())
}

/// Depth-first text extraction skipping subtrees of filtered tags. Each
/// non-empty text node lands on its own line.
fn collect_text(node: NodeRef<'_, Node>, filter_html: &[String], filter_text: &[String], buf: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Element(element) => {
                if filter_html
                    .iter()
                    .any(|tag| tag.eq_ignore_ascii_case(element.name()))
                {
                    continue;
                }
                collect_text(child, filter_html, filter_text, buf);
            }
            Node::Text(text) => {
                let mut line = text.trim().to_string();
                for f in filter_text {
                    line = line.replace(f.as_str(), "");
                }
                if line.is_empty() {
                    continue;
                }
                buf.push_str(&line);
                if !line.ends_with('\n') {
                    buf.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn next_page_url(
    doc: &Html,
    chain: &[Selector],
    page_url: &str,
) -> Result<String, SpiderError> {
    let href = select_href(doc, chain)?;
    if href.is_empty() {
        return Ok(String::new());
    }
    Ok(resolve_url(page_url, &href).unwrap_or_default())
}

/// Resolve a possibly-relative `href` against the page it appeared on.
fn resolve_url(base: &str, href: &str) -> Result<String, SpiderError> {
    let base = Url::parse(base).map_err(|e| SpiderError::InvalidUrl {
        url: base.to_string(),
        reason: e.to_string(),
    })?;
    let joined = base.join(href).map_err(|e| SpiderError::InvalidUrl {
        url: href.to_string(),
        reason: e.to_string(),
    })?;
    Ok(joined.to_string())
}

/// Full crawl: rule lookup, metadata, catalog, then every chapter body in
/// catalog order, projected into a single implicit volume.
pub fn crawl_book(
    fetcher: &Fetcher,
    rules: &RuleSet,
    options: &CrawlOptions<'_>,
) -> Result<Book, SpiderError> {
    let rule = rules
        .get(&options.rule_name)
        .ok_or_else(|| SpiderError::UnknownRule(options.rule_name.clone()))?;

    let metadata = crawl_metadata(fetcher, &options.url, &rule.metadata)?;
    let catalogs = crawl_catalog(fetcher, &options.url, &rule.chapter)?;

    let total = catalogs.len();
    let mut volume = Volume::default();
    for catalog in &catalogs {
        if options.start_chapter > 0 && (catalog.index as i64) < options.start_chapter {
            continue;
        }
        if options.end_chapter > 0 && (catalog.index as i64) > options.end_chapter {
            break;
        }
        if let Some(progress) = options.progress {
            progress(catalog.index + 1, total);
        }
        let content = match crawl_content(fetcher, &catalog.url, &rule.content) {
            Ok(text) => wrap_paragraphs(&text),
            Err(e) if rule.content.skip_err => format!("{}{}", CONTENT_ERROR_PREFIX, e),
            Err(e) => return Err(e),
        };
        volume.chapters.push(Chapter {
            title: catalog.title.clone(),
            content,
            url: catalog.url.clone(),
        });
    }

    Ok(Book {
        name: metadata.name,
        author: metadata.author,
        url: metadata.url,
        rule_name: rule.rule_name.clone(),
        volumes: vec![volume],
        cover: metadata.cover,
        lang: metadata.lang,
        intro: metadata.intro,
        publisher: metadata.publisher,
        publish_date: metadata.publish_date,
    })
}

/// Re-wrap crawled plain text as indented, escaped paragraphs so crawled
/// chapters satisfy the same content shape as parsed ones.
fn wrap_paragraphs(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(html_paragraph)
        .collect()
}
