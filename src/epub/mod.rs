//! Book assembler: maps a [`Book`] onto the external EPUB builder, embedding
//! the stylesheet bundle and the cover image.
//!
//! The container format itself is the builder's concern; this module only
//! decides what goes into it and in which order.

pub mod assets;

use crate::model::{strip_tags, Book};
use crate::spider::client::Fetcher;
use epub_builder::{EpubBuilder, EpubContent, EpubVersion, ZipLibrary};
use regex::Regex;
use reqwest::Url;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EpubError {
    #[error("Book has no volumes to write")]
    EmptyBook,

    #[error("Cover {cover} could not be embedded: {reason}")]
    Cover { cover: String, reason: String },

    #[error(transparent)]
    Builder(#[from] epub_builder::Error),

    #[error("Cannot write EPUB {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Assemble `book` and write it to `output`. An empty `output` defaults to
/// `./{name}.epub`; missing parent directories are created. Returns the path
/// actually written.
///
/// `intro_regex` drives the description fallback: when the first volume is
/// untitled and its first chapter's heading is not an intro-like heading,
/// that chapter's text becomes the book description.
pub fn write_epub(
    book: &Book,
    intro_regex: &Regex,
    fetcher: &Fetcher,
    output: &Path,
) -> Result<PathBuf, EpubError> {
    if book.volumes.is_empty() {
        return Err(EpubError::EmptyBook);
    }

    let mut epub = EpubBuilder::new(ZipLibrary::new()?)?;
    epub.epub_version(EpubVersion::V30);
    epub.metadata("title", &book.name)?;
    epub.metadata("author", &book.author)?;
    epub.set_lang(&book.lang);

    let description = resolve_description(book, intro_regex);
    if !description.is_empty() {
        epub.metadata("description", &description)?;
    }

    for font in assets::FONTS {
        epub.add_resource(format!("fonts/{}", font.name), font.data, font.mime)?;
    }
    for style in assets::STYLES {
        epub.add_resource(format!("styles/{}", style.name), style.data, style.mime)?;
    }
    let imports = assets::stylesheet_imports();
    epub.stylesheet(imports.as_bytes())?;

    if !book.cover.is_empty() {
        embed_cover(&mut epub, &book.cover, fetcher)?;
    }

    for (i, vol) in book.volumes.iter().enumerate() {
        let has_parent = !vol.title.is_empty();
        if has_parent {
            let body = format!("<h1>{}</h1>", xml_escape(&vol.title));
            let page = section_xhtml(&vol.title, &body);
            epub.add_content(
                EpubContent::new(format!("volume{}.xhtml", i), page.as_bytes())
                    .title(vol.title.as_str())
                    .level(1),
            )?;
        }
        for (j, ch) in vol.chapters.iter().enumerate() {
            let body = format!("<h2>{}</h2>{}", xml_escape(&ch.title), ch.content);
            let page = section_xhtml(&ch.title, &body);
            let level = if has_parent { 2 } else { 1 };
            epub.add_content(
                EpubContent::new(format!("volume{}_chapter{}.xhtml", i, j), page.as_bytes())
                    .title(ch.title.as_str())
                    .level(level),
            )?;
        }
    }

    let path = resolve_output_path(output, &book.name);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| EpubError::Io {
                path: path.clone(),
                source: e,
            })?;
        }
    }
    let file = std::fs::File::create(&path).map_err(|e| EpubError::Io {
        path: path.clone(),
        source: e,
    })?;
    epub.generate(file)?;
    Ok(path)
}

/// The description is the crawled intro when present; otherwise, when the
/// first volume is untitled and its first chapter is not an intro heading,
/// that chapter's tag-stripped text (the novel's preface).
fn resolve_description(book: &Book, intro_regex: &Regex) -> String {
    if !book.intro.is_empty() {
        return book.intro.clone();
    }
    let Some(vol) = book.volumes.first() else {
        return String::new();
    };
    if !vol.title.is_empty() {
        return String::new();
    }
    let Some(ch) = vol.chapters.first() else {
        return String::new();
    };
    if intro_regex.is_match(&ch.title) {
        return String::new();
    }
    strip_tags(&ch.content).trim().to_string()
}

fn embed_cover(
    epub: &mut EpubBuilder<ZipLibrary>,
    cover: &str,
    fetcher: &Fetcher,
) -> Result<(), EpubError> {
    let (data, ext, mime) = if is_url(cover) {
        let response = fetcher.get(cover).map_err(|e| EpubError::Cover {
            cover: cover.to_string(),
            reason: e.to_string(),
        })?;
        let (ext, mime) = media_type_from_content_type(response.content_type.as_deref());
        (response.body, ext, mime)
    } else {
        let data = std::fs::read(cover).map_err(|e| EpubError::Cover {
            cover: cover.to_string(),
            reason: e.to_string(),
        })?;
        let (ext, mime) = media_type_from_path(cover);
        (data, ext, mime)
    };
    epub.add_cover_image(format!("images/cover.{}", ext), data.as_slice(), mime)?;
    Ok(())
}

fn is_url(s: &str) -> bool {
    Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https" | "ftp"))
        .unwrap_or(false)
}

/// Media type from a Content-Type header value; unknown types fall back to
/// JPEG.
fn media_type_from_content_type(content_type: Option<&str>) -> (&'static str, &'static str) {
    match content_type {
        Some(ct) if ct.contains("png") => ("png", "image/png"),
        Some(ct) if ct.contains("gif") => ("gif", "image/gif"),
        Some(ct) if ct.contains("webp") => ("webp", "image/webp"),
        _ => ("jpg", "image/jpeg"),
    }
}

fn media_type_from_path(path: &str) -> (&'static str, &'static str) {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => ("png", "image/png"),
        "gif" => ("gif", "image/gif"),
        "webp" => ("webp", "image/webp"),
        _ => ("jpg", "image/jpeg"),
    }
}

fn resolve_output_path(output: &Path, name: &str) -> PathBuf {
    if output.as_os_str().is_empty() {
        PathBuf::from(format!("./{}.epub", name))
    } else {
        output.to_path_buf()
    }
}

/// Wrap a section body as a complete XHTML page linked to the book-wide
/// stylesheet.
fn section_xhtml(title: &str, body: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <html xmlns=\"http://www.w3.org/1999/xhtml\">\n\
         <head>\n  <title>{}</title>\n  <link rel=\"stylesheet\" type=\"text/css\" href=\"stylesheet.css\"/>\n</head>\n\
         <body>\n{}\n</body>\n</html>\n",
        xml_escape(title),
        body
    )
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
