//! Crawl rule loading. A root manifest lists per-site rule files; each file
//! decodes to one [`BookRule`] keyed by its `rule_name` (typically the site
//! host). Rules are immutable once loaded.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from rule loading. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Cannot read rule file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid rule file {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// One CSS narrowing step with optional index pick and attribute projection.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Selector {
    pub css: String,
    /// `>= 0` picks the n-th match in document order; negative keeps the
    /// whole match set.
    pub index: i32,
    /// Attribute to project from the terminal step; empty projects the
    /// element text.
    pub attr: String,
    /// Substrings removed from the projected output, in order.
    pub filter: Vec<String>,
}

impl Selector {
    /// Bare CSS step: first match, text projection, no filters.
    pub fn css(css: &str) -> Self {
        Self {
            css: css.to_string(),
            ..Self::default()
        }
    }
}

/// Selectors for the five metadata fields of a site's book page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MetadataRule {
    pub name_regexp: Selector,
    pub author_regexp: Selector,
    pub intro_regexp: Selector,
    pub category_regexp: Selector,
    pub cover_regexp: Selector,
}

/// Catalog extraction: anchors plus optional pagination chain.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChapterRule {
    pub is_pagination: bool,
    pub pagination_regexp: Vec<Selector>,
    pub catalog_regexp: Vec<Selector>,
}

/// Pagination of chapter bodies: a chain locating the "next" element and the
/// text marking the end of the page run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentPagination {
    pub selector_group: Vec<Selector>,
    pub end_text: String,
}

/// Chapter body extraction and cleanup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContentRule {
    pub is_pagination: bool,
    pub pagination_regexp: ContentPagination,
    pub content_regexp: Vec<Selector>,
    /// Fold a failed chapter fetch into the chapter body instead of aborting.
    pub skip_err: bool,
    pub filter_text: Vec<String>,
    /// Tag names whose subtrees are dropped from the content.
    pub filter_html: Vec<String>,
    /// Microseconds to sleep between content pages.
    pub wait_time: u64,
}

/// The full declarative rule for one site.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookRule {
    pub rule_name: String,
    pub metadata: MetadataRule,
    pub chapter: ChapterRule,
    pub content: ContentRule,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    includes: Vec<PathBuf>,
}

/// Rule set indexed by `rule_name`. Immutable after [`load_rules`].
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: HashMap<String, BookRule>,
}

impl RuleSet {
    pub fn get(&self, name: &str) -> Option<&BookRule> {
        self.rules.get(name)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Load the root manifest and every included rule file. Include paths are
/// resolved relative to the manifest's directory. A `rule_name` appearing in
/// several includes is not an error; the last include wins.
pub fn load_rules(manifest_path: &Path) -> Result<RuleSet, RuleError> {
    let text = read(manifest_path)?;
    let manifest: Manifest = decode(manifest_path, &text)?;
    let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));

    let mut rules = HashMap::new();
    for include in manifest.includes {
        let path = if include.is_absolute() {
            include
        } else {
            base.join(include)
        };
        let text = read(&path)?;
        let rule: BookRule = decode(&path, &text)?;
        rules.insert(rule.rule_name.clone(), rule);
    }
    Ok(RuleSet { rules })
}

fn read(path: &Path) -> Result<String, RuleError> {
    std::fs::read_to_string(path).map_err(|e| RuleError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn decode<T: serde::de::DeserializeOwned>(path: &Path, text: &str) -> Result<T, RuleError> {
    toml::from_str(text).map_err(|e| RuleError::Decode {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE_RULE: &str = r#"
rule_name = "www.example.com"

[metadata]
name_regexp = { css = "h1.title" }
author_regexp = { css = "p.author", filter = ["作者："] }
intro_regexp = { css = "div.intro" }
category_regexp = { css = "p.cat" }
cover_regexp = { css = "img.cover", attr = "src" }

[chapter]
is_pagination = true
pagination_regexp = [{ css = "a.next", attr = "href" }]
catalog_regexp = [{ css = "ul.catalog a", index = -1 }]

[content]
is_pagination = true
content_regexp = [{ css = "div#content", index = -1 }]
skip_err = true
filter_text = ["广告"]
filter_html = ["script"]
wait_time = 100

[content.pagination_regexp]
selector_group = [{ css = "a.next-page" }]
end_text = "下一章"
"#;

    #[test]
    fn decode_full_site_rule() {
        let rule: BookRule = toml::from_str(SITE_RULE).unwrap();
        assert_eq!(rule.rule_name, "www.example.com");
        assert_eq!(rule.metadata.name_regexp.css, "h1.title");
        assert_eq!(rule.metadata.author_regexp.filter, vec!["作者："]);
        assert_eq!(rule.metadata.cover_regexp.attr, "src");
        assert!(rule.chapter.is_pagination);
        assert_eq!(rule.chapter.catalog_regexp[0].index, -1);
        assert_eq!(rule.content.pagination_regexp.end_text, "下一章");
        assert!(rule.content.skip_err);
        assert_eq!(rule.content.wait_time, 100);
    }

    #[test]
    fn decode_defaults_for_omitted_keys() {
        let rule: BookRule = toml::from_str("rule_name = \"x\"").unwrap();
        assert!(!rule.chapter.is_pagination);
        assert!(rule.content.filter_text.is_empty());
        // Omitted index is zero: pick the first match.
        assert_eq!(rule.metadata.name_regexp.index, 0);
    }

    fn write_rules(dir: &Path, manifest: &str, files: &[(&str, &str)]) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        for (name, body) in files {
            std::fs::write(dir.join(name), body).unwrap();
        }
        let manifest_path = dir.join("source.toml");
        std::fs::write(&manifest_path, manifest).unwrap();
        manifest_path
    }

    #[test]
    fn load_rules_resolves_includes_relative_to_manifest() {
        let dir = std::env::temp_dir().join("cnovel_rules_relative");
        let manifest = write_rules(
            &dir,
            "includes = [\"example.toml\"]",
            &[("example.toml", SITE_RULE)],
        );
        let rules = load_rules(&manifest).unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules.get("www.example.com").is_some());
        assert!(rules.get("missing").is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_rules_last_duplicate_wins() {
        let dir = std::env::temp_dir().join("cnovel_rules_dup");
        let first = "rule_name = \"dup\"\n[content]\nskip_err = false\n";
        let second = "rule_name = \"dup\"\n[content]\nskip_err = true\n";
        let manifest = write_rules(
            &dir,
            "includes = [\"a.toml\", \"b.toml\"]",
            &[("a.toml", first), ("b.toml", second)],
        );
        let rules = load_rules(&manifest).unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules.get("dup").unwrap().content.skip_err);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_rules_missing_include_errors() {
        let dir = std::env::temp_dir().join("cnovel_rules_missing");
        let manifest = write_rules(&dir, "includes = [\"absent.toml\"]", &[]);
        let result = load_rules(&manifest);
        assert!(matches!(result, Err(RuleError::Io { .. })));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_rules_malformed_include_errors() {
        let dir = std::env::temp_dir().join("cnovel_rules_malformed");
        let manifest = write_rules(
            &dir,
            "includes = [\"bad.toml\"]",
            &[("bad.toml", "rule_name = [")],
        );
        let result = load_rules(&manifest);
        assert!(matches!(result, Err(RuleError::Decode { .. })));
        std::fs::remove_dir_all(&dir).ok();
    }
}
