use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;

use feedparse::{parse_date, Config, FeedParser, FeedSource};

/// Default config file path (~/.config/feedparse/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedparse").join("config.toml"))
}

/// Splits a `NAME:VALUE` header argument.
fn parse_header(arg: &str) -> Result<(String, String), String> {
    let (name, value) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected NAME:VALUE, got '{arg}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("empty header name in '{arg}'"));
    }
    Ok((name.to_lowercase(), value.trim().to_string()))
}

#[derive(Parser, Debug)]
#[command(name = "feedparse", version, about = "Parse an RSS, Atom, CDF or JSON feed and print it as JSON")]
struct Args {
    /// URL, file path, literal document, or `-` for standard input
    source: String,

    /// Config file (defaults to ~/.config/feedparse/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Response header to apply to the document, e.g. `Content-Type:text/xml`
    #[arg(long = "header", value_name = "NAME:VALUE", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Send `If-None-Match` with this entity tag
    #[arg(long)]
    etag: Option<String>,

    /// Send `If-Modified-Since` with this date
    #[arg(long)]
    modified: Option<String>,

    /// Keep HTML content as found
    #[arg(long)]
    no_sanitize: bool,

    /// Leave relative URIs unresolved
    #[arg(long)]
    no_resolve: bool,

    /// Resolve the encoding from the whole document instead of a prefix
    #[arg(long)]
    whole_buffer: bool,

    /// Print JSON on one line
    #[arg(long)]
    compact: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let mut options = config.parse_options();
    if args.no_sanitize {
        options.sanitize_html = false;
    }
    if args.no_resolve {
        options.resolve_relative_uris = false;
    }
    if args.whole_buffer {
        options.optimistic_encoding_detection = false;
    }
    options.response_headers.extend(args.headers);
    options.request.etag = args.etag;
    if let Some(modified) = &args.modified {
        let parsed = parse_date(modified).with_context(|| format!("Unrecognized date for --modified: {modified}"))?;
        options.request.modified = Some(parsed);
    }

    let source = if args.source == "-" {
        FeedSource::Reader(Box::new(std::io::stdin()))
    } else {
        FeedSource::guess(&args.source)
    };
    tracing::debug!(source = ?source, "Parsing");

    let parser = FeedParser::new(options).with_capabilities(config.capabilities());
    let result = parser.parse(source);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if args.compact {
        serde_json::to_writer(&mut out, &result).context("Failed to serialize result")?;
    } else {
        serde_json::to_writer_pretty(&mut out, &result).context("Failed to serialize result")?;
    }
    writeln!(out).context("Failed to write output")?;

    if result.bozo {
        if let Some(err) = &result.bozo_exception {
            tracing::warn!(kind = err.kind(), error = %err, "Feed is not well formed");
        }
    }
    Ok(())
}
