//! CLI parsing and orchestration: the `epub` (TXT → EPUB) and `crawler`
//! (URL → EPUB/TXT) subcommands, with errors mapped to exit codes.

use crate::epub::{write_epub, EpubError};
use crate::formats::{write_text, FormatError, OutputFormat};
use crate::parser::{parse_file, ParsePatterns, TextParseError};
use crate::rules::{load_rules, RuleError};
use crate::spider::client::Fetcher;
use crate::spider::{crawl_book, CrawlOptions, SpiderError};
use clap::{Parser, Subcommand};
use regex::Regex;
use std::cell::RefCell;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying the message and exit code class.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Rule(#[from] RuleError),

    #[error("{0}")]
    Parse(#[from] TextParseError),

    #[error("{0}")]
    Spider(#[from] SpiderError),

    #[error("{0}")]
    Epub(#[from] EpubError),

    #[error("{0}")]
    Format(#[from] FormatError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) | CliRunError::Rule(_) | CliRunError::Parse(_) => 1,
            CliRunError::Spider(_) => 2,
            CliRunError::Epub(_) | CliRunError::Format(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "cnovel", version)]
#[command(about = "Convert fixed-layout TXT novels or crawl novel sites into EPUB")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert a TXT novel with conventional heading lines into EPUB.
    Epub(EpubArgs),
    /// Crawl a novel site described by a rule file and convert it.
    Crawler(CrawlerArgs),
}

#[derive(clap::Args, Debug)]
pub struct EpubArgs {
    /// Path of the novel TXT file.
    #[arg(short, long)]
    pub file: PathBuf,

    /// Cover image: local path or URL.
    #[arg(long, visible_alias = "img")]
    pub cover: Option<String>,

    /// Override for the chapter heading regex.
    #[arg(short = 'r', long = "title-regexp")]
    pub title_regexp: Option<String>,

    /// Override for the volume heading regex.
    #[arg(long = "volume-regexp", visible_alias = "vr")]
    pub volume_regexp: Option<String>,

    /// Override for the extra-section (番外) heading regex.
    #[arg(long = "extra-regexp")]
    pub extra_regexp: Option<String>,

    /// Override for the intro heading regex.
    #[arg(long = "intro-regexp")]
    pub intro_regexp: Option<String>,

    /// Book name; parsed from the file when omitted.
    #[arg(long)]
    pub name: Option<String>,

    /// Author; parsed from the file when omitted.
    #[arg(long)]
    pub author: Option<String>,

    /// Language code, e.g. zh-CN, en, ja.
    #[arg(long)]
    pub lang: Option<String>,

    /// Introduction; recovered from the preface when omitted.
    #[arg(long)]
    pub intro: Option<String>,

    #[arg(long)]
    pub publisher: Option<String>,

    /// Publish date.
    #[arg(long)]
    pub date: Option<String>,

    /// Output EPUB path. Defaults to ./{name}.epub.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(clap::Args, Debug)]
pub struct CrawlerArgs {
    /// Catalog page URL of the novel.
    #[arg(short, long)]
    pub url: String,

    /// Root rules manifest.
    #[arg(short = 'c', long = "rule-path", default_value = "./conf/source.toml")]
    pub rule_path: PathBuf,

    /// Rule name; the URL's host when omitted.
    #[arg(short = 'r', long = "rule-name")]
    pub rule_name: Option<String>,

    /// First chapter index to crawl (inclusive, 0 = from the start).
    #[arg(short = 's', long = "start-chapter", default_value_t = 0)]
    pub start_chapter: i64,

    /// Last chapter index to crawl (inclusive, 0 = to the end).
    #[arg(short = 'e', long = "end-chapter", default_value_t = 0)]
    pub end_chapter: i64,

    /// Output format: epub or txt.
    #[arg(short = 'f', long, default_value = "epub", value_parser = parse_format)]
    pub format: OutputFormat,

    /// Output path.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    match s.to_lowercase().as_str() {
        "epub" => Ok(OutputFormat::Epub),
        "txt" | "text" => Ok(OutputFormat::Txt),
        _ => Err(format!("Invalid --format value: '{}'. Use epub or txt.", s)),
    }
}

fn compile_override(name: &str, pattern: &str) -> Result<Regex, CliRunError> {
    Regex::new(pattern)
        .map_err(|e| CliRunError::InvalidInput(format!("Invalid {} '{}': {}", name, pattern, e)))
}

fn build_patterns(args: &EpubArgs) -> Result<ParsePatterns, CliRunError> {
    let mut patterns = ParsePatterns::default();
    if let Some(p) = &args.title_regexp {
        patterns.chapter = compile_override("--title-regexp", p)?;
    }
    if let Some(p) = &args.volume_regexp {
        patterns.volume = compile_override("--volume-regexp", p)?;
    }
    if let Some(p) = &args.extra_regexp {
        patterns.extra = compile_override("--extra-regexp", p)?;
    }
    if let Some(p) = &args.intro_regexp {
        patterns.intro = compile_override("--intro-regexp", p)?;
    }
    Ok(patterns)
}

fn build_fetcher() -> Result<Fetcher, CliRunError> {
    Fetcher::new()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))
}

fn host_of(url: &str) -> Result<String, CliRunError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| CliRunError::InvalidInput(format!("Invalid URL '{}': {}", url, e)))?;
    parsed
        .host_str()
        .map(String::from)
        .ok_or_else(|| CliRunError::InvalidInput(format!("URL '{}' has no host", url)))
}

/// Entry point for the CLI. Returns Ok on success; Err carries the message
/// and exit code.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    match &args.command {
        Command::Epub(epub_args) => run_epub(epub_args),
        Command::Crawler(crawler_args) => run_crawler(crawler_args),
    }
}

fn run_epub(args: &EpubArgs) -> Result<(), CliRunError> {
    let patterns = build_patterns(args)?;
    let mut book = parse_file(&args.file, &patterns)?;

    if let Some(name) = &args.name {
        book.name = name.clone();
    }
    if let Some(author) = &args.author {
        book.author = author.clone();
    }
    if let Some(lang) = &args.lang {
        book.lang = lang.clone();
    }
    if let Some(intro) = &args.intro {
        book.intro = intro.clone();
    }
    if let Some(publisher) = &args.publisher {
        book.publisher = publisher.clone();
    }
    if let Some(date) = &args.date {
        book.publish_date = date.clone();
    }
    if let Some(cover) = &args.cover {
        book.cover = cover.clone();
    }

    if !args.quiet {
        eprintln!("Parsed {}: {} volume(s)", book.name, book.volumes.len());
    }

    let fetcher = build_fetcher()?;
    let output = args.output.clone().unwrap_or_default();
    let written = write_epub(&book, &patterns.intro, &fetcher, &output)?;
    if !args.quiet {
        eprintln!("Wrote {}", written.display());
    }
    Ok(())
}

fn run_crawler(args: &CrawlerArgs) -> Result<(), CliRunError> {
    let rules = load_rules(&args.rule_path)?;
    let rule_name = match &args.rule_name {
        Some(name) => name.clone(),
        None => host_of(&args.url)?,
    };
    let fetcher = build_fetcher()?;

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: usize, total: usize| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let bar = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            bar.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
                    .unwrap()
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        bar.set_position(n as u64);
        bar.set_message(format!("Fetching chapter {}/{}", n, total));
    };
    let progress: Option<&dyn Fn(usize, usize)> = if args.quiet { None } else { Some(&progress_cb) };

    let options = CrawlOptions {
        url: args.url.clone(),
        rule_name,
        start_chapter: args.start_chapter,
        end_chapter: args.end_chapter,
        progress,
    };
    let book = crawl_book(&fetcher, &rules, &options)?;

    if let Some(bar) = progress_state.borrow_mut().take() {
        bar.disable_steady_tick();
        bar.finish_and_clear();
    }

    match args.format {
        OutputFormat::Epub => {
            let patterns = ParsePatterns::default();
            write_epub(&book, &patterns.intro, &fetcher, &args.output)?;
        }
        OutputFormat::Txt => write_text(&book, &args.output)?,
    }

    if !args.quiet {
        eprintln!("Wrote {}", args.output.display());
    }
    Ok(())
}
