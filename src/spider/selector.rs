//! Selector-chain evaluation over a parsed HTML document.
//!
//! A chain is a sequence of CSS narrowings starting from `<body>`. Each step
//! may pick the n-th match (`index >= 0`) or keep the whole set; the terminal
//! step may project an attribute instead of the element text, and carries the
//! substring filters applied to the projected value.

use crate::rules::Selector;
use scraper::{ElementRef, Html};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SelectorError {
    #[error("invalid selector {css:?}: {message}")]
    Invalid { css: String, message: String },
}

fn parse(css: &str) -> Result<scraper::Selector, SelectorError> {
    scraper::Selector::parse(css).map_err(|e| SelectorError::Invalid {
        css: css.to_string(),
        message: e.to_string(),
    })
}

/// Evaluate a chain to the narrowed element set, in document order.
///
/// An empty `css` at any step yields the empty set; an out-of-range `index`
/// yields the empty set as well.
pub fn select_elements<'a>(
    doc: &'a Html,
    chain: &[Selector],
) -> Result<Vec<ElementRef<'a>>, SelectorError> {
    let body = parse("body")?;
    let mut current: Vec<ElementRef<'a>> = doc.select(&body).collect();

    for step in chain {
        if step.css.is_empty() {
            return Ok(Vec::new());
        }
        let selector = parse(&step.css)?;
        let mut seen = HashSet::new();
        let mut narrowed = Vec::new();
        for element in &current {
            for found in element.select(&selector) {
                if seen.insert(found.id()) {
                    narrowed.push(found);
                }
            }
        }
        if step.index >= 0 {
            narrowed = narrowed
                .get(step.index as usize)
                .copied()
                .into_iter()
                .collect();
        }
        current = narrowed;
    }
    Ok(current)
}

/// Evaluate a chain and project the terminal value: the named attribute of
/// the first element when `attr` is set, else the concatenated text of the
/// set. The result is trimmed and the terminal step's filters are stripped.
pub fn select_value(doc: &Html, chain: &[Selector]) -> Result<String, SelectorError> {
    let Some(terminal) = chain.last() else {
        return Ok(String::new());
    };
    let elements = select_elements(doc, chain)?;
    let raw: String = if terminal.attr.is_empty() {
        elements.iter().flat_map(|el| el.text()).collect()
    } else {
        elements
            .first()
            .and_then(|el| el.value().attr(&terminal.attr))
            .unwrap_or_default()
            .to_string()
    };
    Ok(apply_filters(raw.trim(), &terminal.filter))
}

/// Like [`select_value`] but projecting `href` when the terminal step has no
/// attribute configured. Used for pagination lookups.
pub fn select_href(doc: &Html, chain: &[Selector]) -> Result<String, SelectorError> {
    let Some(terminal) = chain.last() else {
        return Ok(String::new());
    };
    let attr = if terminal.attr.is_empty() {
        "href"
    } else {
        terminal.attr.as_str()
    };
    let elements = select_elements(doc, chain)?;
    let raw = elements
        .first()
        .and_then(|el| el.value().attr(attr))
        .unwrap_or_default();
    Ok(apply_filters(raw.trim(), &terminal.filter))
}

fn apply_filters(value: &str, filters: &[String]) -> String {
    let mut out = value.to_string();
    for f in filters {
        out = out.replace(f.as_str(), "");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
<div class="a">
  <a href="https://example.com/1">第一章</a>
  <a href="https://example.com/2">第二章</a>
</div>
<div class="a">
  <a href="https://example.com/3">第三章</a>
</div>
</body></html>"#;

    #[test]
    fn index_picks_nth_match_and_projects_attr() {
        let doc = Html::parse_document(PAGE);
        let steps = vec![
            Selector::css("div.a"),
            Selector {
                css: "a".to_string(),
                index: 1,
                attr: "href".to_string(),
                filter: vec!["https://".to_string()],
            },
        ];
        let value = select_value(&doc, &steps).unwrap();
        assert_eq!(value, "example.com/2");
    }

    #[test]
    fn negative_index_keeps_whole_set() {
        let doc = Html::parse_document(PAGE);
        let steps = vec![
            Selector {
                css: "div.a".to_string(),
                index: -1,
                ..Selector::default()
            },
            Selector {
                css: "a".to_string(),
                index: -1,
                ..Selector::default()
            },
        ];
        let elements = select_elements(&doc, &steps).unwrap();
        assert_eq!(elements.len(), 3);
        let text = select_value(&doc, &steps).unwrap();
        assert_eq!(text, "第一章第二章第三章");
    }

    #[test]
    fn default_index_picks_first_match() {
        let doc = Html::parse_document(PAGE);
        let steps = vec![Selector::css("div.a"), Selector::css("a")];
        let value = select_value(&doc, &steps).unwrap();
        assert_eq!(value, "第一章");
    }

    #[test]
    fn empty_css_yields_empty_string() {
        let doc = Html::parse_document(PAGE);
        let steps = vec![Selector::css("")];
        assert_eq!(select_value(&doc, &steps).unwrap(), "");
        assert!(select_elements(&doc, &steps).unwrap().is_empty());
    }

    #[test]
    fn out_of_range_index_yields_empty_set() {
        let doc = Html::parse_document(PAGE);
        let steps = vec![Selector {
            css: "div.a".to_string(),
            index: 9,
            ..Selector::default()
        }];
        assert!(select_elements(&doc, &steps).unwrap().is_empty());
    }

    #[test]
    fn select_href_defaults_to_href_attribute() {
        let doc = Html::parse_document(PAGE);
        let steps = vec![Selector::css("div.a a")];
        assert_eq!(select_href(&doc, &steps).unwrap(), "https://example.com/1");
    }

    #[test]
    fn invalid_css_is_an_error() {
        let doc = Html::parse_document(PAGE);
        let steps = vec![Selector::css("div..[")];
        assert!(matches!(
            select_elements(&doc, &steps),
            Err(SelectorError::Invalid { .. })
        ));
    }
}
