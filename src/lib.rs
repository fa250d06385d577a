//! cnovel: convert fixed-layout TXT novels or crawl novel sites into EPUB.

pub mod cli;
pub mod epub;
pub mod formats;
pub mod model;
pub mod parser;
pub mod rules;
pub mod spider;

// Re-exports for CLI and consumers.
pub use epub::{write_epub, EpubError};
pub use formats::{write_text, FormatError, OutputFormat};
pub use model::{Book, Chapter, Volume};
pub use parser::{parse_file, parse_reader, ParsePatterns, TextParseError};
pub use rules::{load_rules, BookRule, RuleError, RuleSet, Selector};
pub use spider::client::{FetchError, Fetcher, FetcherBuilder};
pub use spider::{crawl_book, crawl_catalog, crawl_content, crawl_metadata, Catalog, CrawlOptions, Metadata, SpiderError};
