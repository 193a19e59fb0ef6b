//! CLI mode for media-bundle: download URLs into a file or ZIP archive.

mod progress;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::{
    AppConfig, BulkDownloadResult, BulkDownloader, BulkOptions, Compression, DownloadItem, Error,
    Orchestrator, ProgressSink, Result,
};

use progress::{BarProgress, make_progress_bar, print_summary};

/// Name used when a URL has no usable last path segment.
const FALLBACK_NAME: &str = "file.bin";

/// Usage text printed for `-h/--help`.
pub const USAGE: &str = "\
Usage: media-bundle [OPTIONS] <url|@listfile>...

Downloads one or more URLs. A single URL is saved as-is; several are
bundled into one ZIP archive.

Options:
  -o, --output <DIR>        Output directory (default: config or .)
  -c, --concurrency <N>     Parallel downloads, clamped to 1..=8 (default: 4)
  -r, --retries <N>         Retries per file (default: 3)
      --name-prefix <NAME>  Prefix for generated archive names
      --zip-name <FILE>     Archive file name
      --deflate             Compress archive entries
      --json                Print the result as JSON
  -h, --help                Show this help

A listfile holds one URL per line, optionally followed by a tab and the
file name to use inside the archive. Lines starting with # are ignored.";

/// Parsed command line for a download.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub output: Option<PathBuf>,
    pub concurrency: Option<i64>,
    pub retries: Option<i64>,
    pub name_prefix: Option<String>,
    pub zip_name: Option<String>,
    pub deflate: bool,
    pub json: bool,
    /// URLs and `@listfile` references, in order.
    pub sources: Vec<String>,
}

/// What the binary should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Download(CliArgs),
}

fn value_for(flag: &str, value: Option<String>) -> Result<String> {
    value.ok_or_else(|| Error::Config(format!("{flag} requires a value")))
}

fn number_for(flag: &str, value: Option<String>) -> Result<i64> {
    let value = value_for(flag, value)?;
    value
        .parse()
        .map_err(|_| Error::Config(format!("{flag} expects a number, got '{value}'")))
}

/// Parses command line arguments, excluding the program name.
///
/// # Errors
///
/// Returns [`Error::Config`] for unknown flags, missing or malformed values,
/// or when no URL is given.
pub fn parse_args<I>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-o" | "--output" => parsed.output = Some(value_for(&arg, args.next())?.into()),
            "-c" | "--concurrency" => parsed.concurrency = Some(number_for(&arg, args.next())?),
            "-r" | "--retries" => parsed.retries = Some(number_for(&arg, args.next())?),
            "--name-prefix" => parsed.name_prefix = Some(value_for(&arg, args.next())?),
            "--zip-name" => parsed.zip_name = Some(value_for(&arg, args.next())?),
            "--deflate" => parsed.deflate = true,
            "--json" => parsed.json = true,
            flag if flag.starts_with('-') && flag.len() > 1 => {
                return Err(Error::Config(format!("unknown option '{flag}'")));
            }
            _ => parsed.sources.push(arg),
        }
    }

    if parsed.sources.is_empty() {
        return Err(Error::Config("no URLs given".to_string()));
    }
    Ok(Command::Download(parsed))
}

/// Derives a file name from the last path segment of `url`.
#[must_use]
pub fn name_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| FALLBACK_NAME.to_string())
}

/// Parses one listfile line into an item.
///
/// Blank lines and `#` comments yield `None`.
#[must_use]
pub fn parse_list_line(line: &str) -> Option<DownloadItem> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (url, name) = match line.split_once('\t') {
        Some((url, name)) if !name.trim().is_empty() => (url.trim(), name.trim().to_string()),
        Some((url, _)) => (url.trim(), name_from_url(url.trim())),
        None => (line, name_from_url(line)),
    };
    Some(DownloadItem::new(url, name))
}

/// Expands URLs and `@listfile` references into download items.
///
/// # Errors
///
/// Returns an error if a listfile cannot be read.
pub async fn collect_items(sources: &[String]) -> Result<Vec<DownloadItem>> {
    let mut items = Vec::new();
    for source in sources {
        if let Some(path) = source.strip_prefix('@') {
            let contents = tokio::fs::read_to_string(path).await?;
            let before = items.len();
            items.extend(contents.lines().filter_map(parse_list_line));
            log::info!("Read {} URL(s) from {path}", items.len() - before);
        } else {
            items.push(DownloadItem::new(source.as_str(), name_from_url(source)));
        }
    }
    Ok(items)
}

/// Runs a download from parsed arguments, cancelling on Ctrl-C.
///
/// # Errors
///
/// Returns an error if configuration, listfiles, or the HTTP client cannot
/// be set up. Download failures are reported in the returned result.
pub async fn run(args: CliArgs) -> Result<BulkDownloadResult> {
    let mut config = AppConfig::load()?;
    if args.deflate {
        config.download.compression = Compression::Deflated;
    }
    let output = args.output.unwrap_or(config.paths.output_dir);

    let items = collect_items(&args.sources).await?;
    let orchestrator = Orchestrator::new(config.download)?;
    let downloader = BulkDownloader::new(orchestrator, output);
    log::info!(
        "Downloading {} item(s) into {}",
        items.len(),
        downloader.output_dir().display()
    );

    let bar = if args.json {
        indicatif::ProgressBar::hidden()
    } else {
        make_progress_bar(items.len())
    };
    let sink: Arc<dyn ProgressSink> = Arc::new(BarProgress::new(bar.clone()));
    let options = BulkOptions {
        concurrency: args.concurrency,
        retries: args.retries,
        zip_filename: args.zip_name,
        name_prefix: args.name_prefix,
        progress: Some(sink),
        cancel: None,
    };

    let started = Instant::now();
    let download = downloader.download(&items, options);
    tokio::pin!(download);
    let result = loop {
        tokio::select! {
            result = &mut download => break result,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    log::warn!("Failed to listen for Ctrl-C: {e}");
                }
                log::info!("Received SIGINT, cancelling");
                downloader.cancel();
            }
        }
    };
    bar.finish_and_clear();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        let size = match &result.path {
            Some(path) => tokio::fs::metadata(path).await.ok().map(|m| m.len()),
            None => None,
        };
        print_summary(&result, size, started.elapsed());
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn parses_flags_and_urls() {
        let cmd = parse_args(args(&[
            "-o",
            "out",
            "--concurrency",
            "0",
            "-r",
            "-2",
            "--name-prefix",
            "trip",
            "--json",
            "https://a/1.jpg",
            "@list.txt",
        ]))
        .unwrap();

        let Command::Download(parsed) = cmd else {
            panic!("expected download");
        };
        assert_eq!(parsed.output, Some(PathBuf::from("out")));
        assert_eq!(parsed.concurrency, Some(0));
        assert_eq!(parsed.retries, Some(-2));
        assert_eq!(parsed.name_prefix.as_deref(), Some("trip"));
        assert!(parsed.json);
        assert!(!parsed.deflate);
        assert_eq!(parsed.sources, args(&["https://a/1.jpg", "@list.txt"]));
    }

    #[test]
    fn help_wins() {
        assert_eq!(parse_args(args(&["https://a", "-h"])).unwrap(), Command::Help);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(args(&[])).is_err());
        assert!(parse_args(args(&["-c"])).is_err());
        assert!(parse_args(args(&["-c", "many", "https://a"])).is_err());
        assert!(parse_args(args(&["--bogus", "https://a"])).is_err());
    }

    #[test]
    fn name_from_url_uses_last_segment() {
        assert_eq!(name_from_url("https://cdn.example.com/a/b/photo.jpg?x=1"), "photo.jpg");
        assert_eq!(name_from_url("https://cdn.example.com/"), "file.bin");
        assert_eq!(name_from_url("not a url"), "file.bin");
    }

    #[test]
    fn list_lines() {
        assert!(parse_list_line("").is_none());
        assert!(parse_list_line("   # comment").is_none());

        let item = parse_list_line("https://cdn/x/1.jpg").unwrap();
        assert_eq!(item.url, "https://cdn/x/1.jpg");
        assert_eq!(item.desired_name, "1.jpg");

        let item = parse_list_line("https://cdn/x/1.jpg\tcover.jpg").unwrap();
        assert_eq!(item.desired_name, "cover.jpg");

        let item = parse_list_line("https://cdn/x/1.jpg\t  ").unwrap();
        assert_eq!(item.desired_name, "1.jpg");
    }

    #[tokio::test]
    async fn collect_items_expands_listfiles() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("urls.txt");
        std::fs::write(&list, "https://cdn/1.jpg\n\n# skip\nhttps://cdn/2\tsecond.png\n").unwrap();

        let sources = vec![
            "https://cdn/0.gif".to_string(),
            format!("@{}", list.display()),
        ];
        let items = collect_items(&sources).await.unwrap();
        let names: Vec<_> = items.iter().map(|i| i.desired_name.as_str()).collect();
        assert_eq!(names, vec!["0.gif", "1.jpg", "second.png"]);
    }

    #[tokio::test]
    async fn missing_listfile_is_an_error() {
        let sources = vec!["@/nonexistent/urls.txt".to_string()];
        assert!(matches!(collect_items(&sources).await, Err(Error::Io(_))));
    }
}
