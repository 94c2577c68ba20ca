use std::num::{NonZeroU64, NonZeroUsize};
use std::path::PathBuf;
use std::thread;

use clap::Parser;
use reqwest::Url;

#[derive(Clone, Debug, Parser)]
#[command(name = "tessera", version = env!("CARGO_PKG_VERSION"), about, long_about = None)]
pub struct App {
    /// Resource to download
    #[arg(value_name = "URL", required_unless_present = "url_flag", conflicts_with = "url_flag")]
    pub url: Option<Url>,

    /// Resource to download, as an option
    #[arg(short = 'u', long = "url", value_name = "URL")]
    pub url_flag: Option<Url>,

    /// Output file, or an existing directory to save into
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Ranges fetched at the same time
    #[arg(short = 'n', long, default_value_t = default_concurrency())]
    pub concurrency: NonZeroUsize,

    /// Split into ranges of this size (e.g. 4M) instead of one per worker
    #[arg(short = 'b', long, value_parser = parse_size)]
    pub block_size: Option<NonZeroU64>,

    /// Retries per range before giving up
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Proxy for http:// or https:// traffic, by the proxy's own scheme
    #[arg(short = 'p', long = "proxy", value_name = "URL")]
    pub proxies: Vec<Url>,

    /// Extra request header, `Name: value`
    #[arg(short = 'H', long = "header", value_name = "HEADER", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Connect timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Debug logging on stderr
    #[arg(short, long)]
    pub verbose: bool,
}

impl App {
    pub fn url(&self) -> Option<&Url> { self.url.as_ref().or(self.url_flag.as_ref()) }
}

fn default_concurrency() -> NonZeroUsize { thread::available_parallelism().unwrap_or(NonZeroUsize::MIN) }

fn parse_size(s: &str) -> Result<NonZeroU64, String> {
    let s = s.trim();
    let (digits, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(at) => s.split_at(at),
        None => (s, ""),
    };

    let scale: u64 = match unit.trim().to_ascii_uppercase().trim_end_matches("IB").trim_end_matches('B') {
        "" => 1,
        "K" => 1 << 10,
        "M" => 1 << 20,
        "G" => 1 << 30,
        other => return Err(format!("unknown size unit `{other}`")),
    };

    let n: u64 = digits.parse().map_err(|_| format!("invalid size `{s}`"))?;
    n.checked_mul(scale)
        .and_then(NonZeroU64::new)
        .ok_or_else(|| format!("size `{s}` must be between 1 byte and 16 EiB"))
}

fn parse_header(s: &str) -> Result<(String, String), String> {
    let Some((name, value)) = s.split_once(':') else {
        return Err(format!("expected `Name: value`, got `{s}`"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err("header name is empty".to_string());
    }
    Ok((name.to_string(), value.trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_url_and_defaults() {
        let app = App::try_parse_from(["tessera", "https://example.com/a.iso"]).unwrap();
        assert_eq!(app.url().unwrap().as_str(), "https://example.com/a.iso");
        assert_eq!(app.output, PathBuf::from("."));
        assert_eq!(app.concurrency, default_concurrency());
        assert_eq!(app.block_size, None);
        assert_eq!(app.retries, 3);
        assert!(!app.verbose);
    }

    #[test]
    fn test_url_flag_and_options() {
        let app = App::try_parse_from([
            "tessera", "-u", "http://h/f", "-o", "out.bin", "-n", "8", "-b", "4M", "-p",
            "https://proxy:8443", "-H", "Authorization: Bearer t", "-v",
        ])
        .unwrap();

        assert_eq!(app.url().unwrap().as_str(), "http://h/f");
        assert_eq!(app.output, PathBuf::from("out.bin"));
        assert_eq!(app.concurrency.get(), 8);
        assert_eq!(app.block_size.map(NonZeroU64::get), Some(4 << 20));
        assert_eq!(app.proxies.len(), 1);
        assert_eq!(app.headers, vec![("Authorization".to_string(), "Bearer t".to_string())]);
        assert!(app.verbose);
    }

    #[test]
    fn test_url_is_required() {
        assert!(App::try_parse_from(["tessera"]).is_err());
        assert!(App::try_parse_from(["tessera", "http://a/x", "-u", "http://b/y"]).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        assert!(App::try_parse_from(["tessera", "http://h/f", "-n", "0"]).is_err());
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("512").unwrap().get(), 512);
        assert_eq!(parse_size("64k").unwrap().get(), 64 << 10);
        assert_eq!(parse_size("2MiB").unwrap().get(), 2 << 20);
        assert_eq!(parse_size("1G").unwrap().get(), 1 << 30);
        assert!(parse_size("0").is_err());
        assert!(parse_size("3X").is_err());
        assert!(parse_size("M").is_err());
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_header("X-Token:abc").unwrap(), ("X-Token".to_string(), "abc".to_string()));
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }
}
