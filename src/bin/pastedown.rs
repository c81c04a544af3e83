//! CLI binary for pastedown.
//!
//! A thin shim over the library crate: each subcommand maps its flags to a
//! `PipelineConfig`, drives an `EditorSession` over a `MemoryDocument` (or a
//! single pipeline stage) and prints the result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pastedown::{
    markdown_to_html, read_image_file, strip_noise, BulletMarker, ClipboardData, EditorSession,
    EmphasisStyle, FenceStyle, Fragment, HttpUploader, MarkdownBridge, MarkdownStyle,
    MemoryDocument, PipelineConfig, ProgressCallback, UploadProgressCallback,
};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress for one upload batch. Uploads complete out of order,
/// so every line names the image it belongs to.
struct CliUploadProgress {
    bar: ProgressBar,
}

impl CliUploadProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} images  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Uploading");

        Arc::new(Self { bar })
    }
}

impl UploadProgressCallback for CliUploadProgress {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.reset_eta();
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_upload_start(&self, _index: usize, _total: usize, filename: &str) {
        self.bar.set_message(filename.to_string());
    }

    fn on_upload_complete(&self, index: usize, total: usize, url: &str) {
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}",
            green("✓"),
            index + 1,
            total,
            dim(url)
        ));
        self.bar.inc(1);
    }

    fn on_upload_error(&self, index: usize, total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Image {:>3}/{:<3}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success_count);
        if failed == 0 {
            eprintln!(
                "{} {} image(s) uploaded",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} image(s) uploaded  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Paste clipboard HTML exported from a word processor into a new document
  pastedown paste --html clip.html --upload-url http://localhost:4000/api/uploads/images

  # Paste into an existing article and write the result back
  pastedown paste --seed article.md --html clip.html -o article.md

  # Insert one image at the end of an article
  pastedown insert-image diagram.png --seed article.md -o article.md

  # Strip office-suite noise only
  pastedown clean clip.html

  # Convert in either direction
  pastedown to-markdown page.html
  pastedown to-html article.md

ENVIRONMENT VARIABLES:
  PASTEDOWN_UPLOAD_URL      Image upload endpoint (multipart POST, field "images")
  PASTEDOWN_UPLOAD_TIMEOUT  Per-upload timeout in seconds
  PASTEDOWN_MAX_RETRIES     Retries after a transient upload failure
  RUST_LOG                  Override log filter (e.g. pastedown=debug)
"#;

/// Clean pasted HTML, upload embedded images and convert to Markdown.
#[derive(Parser, Debug)]
#[command(
    name = "pastedown",
    version,
    about = "Clean pasted HTML, upload embedded images and convert to Markdown",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PASTEDOWN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PASTEDOWN_QUIET")]
    quiet: bool,

    /// Disable the upload progress bar.
    #[arg(long, global = true, env = "PASTEDOWN_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Paste clipboard content into a document and print its Markdown.
    Paste(PasteArgs),
    /// Upload one image file and insert it into a document.
    InsertImage(InsertImageArgs),
    /// Strip producer noise from HTML and print the cleaned HTML.
    Clean(InputArgs),
    /// Convert HTML to Markdown.
    ToMarkdown(ToMarkdownArgs),
    /// Convert Markdown to HTML.
    ToHtml(InputArgs),
}

#[derive(Args, Debug)]
struct PasteArgs {
    /// HTML clipboard representation ('-' for stdin).
    #[arg(long)]
    html: Option<PathBuf>,

    /// Plain-text clipboard representation.
    #[arg(long)]
    text: Option<PathBuf>,

    /// Image file on the clipboard (repeatable).
    #[arg(long = "image")]
    images: Vec<PathBuf>,

    #[command(flatten)]
    document: DocumentArgs,

    #[command(flatten)]
    upload: UploadArgs,

    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Args, Debug)]
struct InsertImageArgs {
    /// Image file to upload.
    image: PathBuf,

    #[command(flatten)]
    document: DocumentArgs,

    #[command(flatten)]
    upload: UploadArgs,

    #[command(flatten)]
    style: StyleArgs,
}

#[derive(Args, Debug)]
struct DocumentArgs {
    /// Stored Markdown to load into the document first.
    #[arg(long, env = "PASTEDOWN_SEED")]
    seed: Option<PathBuf>,

    /// Write Markdown to this file instead of stdout.
    #[arg(short, long, env = "PASTEDOWN_OUTPUT")]
    output: Option<PathBuf>,

    /// Output the outcome and Markdown as JSON.
    #[arg(long, env = "PASTEDOWN_JSON")]
    json: bool,
}

#[derive(Args, Debug)]
struct UploadArgs {
    /// Image upload endpoint.
    #[arg(long, env = "PASTEDOWN_UPLOAD_URL")]
    upload_url: Option<String>,

    /// Multipart field carrying the image.
    #[arg(long, env = "PASTEDOWN_UPLOAD_FIELD", default_value = "images")]
    upload_field: String,

    /// Per-upload timeout in seconds.
    #[arg(long, env = "PASTEDOWN_UPLOAD_TIMEOUT", default_value_t = 30)]
    upload_timeout: u64,

    /// Retries after a transient upload failure.
    #[arg(long, env = "PASTEDOWN_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Initial retry delay in milliseconds.
    #[arg(long, env = "PASTEDOWN_RETRY_BACKOFF_MS", default_value_t = 500)]
    retry_backoff_ms: u64,

    /// Maximum concurrent uploads (default: all at once).
    #[arg(short, long, env = "PASTEDOWN_CONCURRENCY")]
    concurrency: Option<usize>,
}

#[derive(Args, Debug)]
struct StyleArgs {
    /// Emphasis delimiter.
    #[arg(long, env = "PASTEDOWN_EMPHASIS", value_enum, default_value = "asterisk")]
    emphasis: EmphasisArg,

    /// Bullet list marker.
    #[arg(long, env = "PASTEDOWN_BULLET", value_enum, default_value = "dash")]
    bullet: BulletArg,

    /// Code fence character.
    #[arg(long, env = "PASTEDOWN_FENCE", value_enum, default_value = "backtick")]
    fence: FenceArg,
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Input file ('-' for stdin).
    input: PathBuf,
}

#[derive(Args, Debug)]
struct ToMarkdownArgs {
    /// Input file ('-' for stdin).
    input: PathBuf,

    #[command(flatten)]
    style: StyleArgs,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EmphasisArg {
    Asterisk,
    Underscore,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BulletArg {
    Dash,
    Asterisk,
    Plus,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FenceArg {
    Backtick,
    Tilde,
}

impl From<&StyleArgs> for MarkdownStyle {
    fn from(args: &StyleArgs) -> Self {
        MarkdownStyle {
            emphasis: match args.emphasis {
                EmphasisArg::Asterisk => EmphasisStyle::Asterisk,
                EmphasisArg::Underscore => EmphasisStyle::Underscore,
            },
            bullet: match args.bullet {
                BulletArg::Dash => BulletMarker::Dash,
                BulletArg::Asterisk => BulletMarker::Asterisk,
                BulletArg::Plus => BulletMarker::Plus,
            },
            fence: match args.fence {
                FenceArg::Backtick => FenceStyle::Backtick,
                FenceArg::Tilde => FenceStyle::Tilde,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let json = match &cli.command {
        Command::Paste(a) => a.document.json,
        Command::InsertImage(a) => a.document.json,
        _ => false,
    };
    let show_progress = !cli.quiet && !cli.no_progress && !json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliUploadProgress::new() as Arc<dyn UploadProgressCallback>)
    } else {
        None
    };

    match cli.command {
        Command::Paste(args) => run_paste(args, progress, cli.quiet).await,
        Command::InsertImage(args) => run_insert_image(args, progress, cli.quiet).await,
        Command::Clean(args) => {
            let html = read_input(&args.input).await?;
            let mut fragment = Fragment::parse(&html).context("Failed to parse HTML")?;
            let config = PipelineConfig::default();
            let stats = strip_noise(&mut fragment, &config.noise);
            if !cli.quiet {
                eprintln!(
                    "{}",
                    dim(&format!(
                        "removed {} comment(s), {} element(s), {} attribute(s)",
                        stats.comments, stats.elements, stats.attributes
                    ))
                );
            }
            write_stdout(&fragment.to_html())
        }
        Command::ToMarkdown(args) => {
            let html = read_input(&args.input).await?;
            let bridge = MarkdownBridge::new(MarkdownStyle::from(&args.style));
            write_stdout(&bridge.to_markdown(&html))
        }
        Command::ToHtml(args) => {
            let markdown = read_input(&args.input).await?;
            write_stdout(&markdown_to_html(&markdown))
        }
    }
}

async fn run_paste(args: PasteArgs, progress: Option<ProgressCallback>, quiet: bool) -> Result<()> {
    let config = build_config(&args.upload, &args.style, progress)?;
    let session = open_session(&args.document, config).await?;

    let mut data = ClipboardData::new();
    if let Some(ref path) = args.html {
        data = data.with_html(read_input(path).await?);
    }
    if let Some(ref path) = args.text {
        data = data.with_text(read_input(path).await?);
    }
    for path in &args.images {
        let file = read_image_file(path)
            .await
            .with_context(|| format!("Failed to load clipboard image {}", path.display()))?;
        data = data.with_file(file);
    }

    let outcome = session.paste(data).await;
    if !quiet {
        for warning in &outcome.warnings {
            eprintln!("{} {}", cyan("⚠"), warning);
        }
    }

    let markdown = session.close();
    if args.document.json {
        let json = serde_json::json!({ "outcome": outcome, "markdown": markdown });
        let text = serde_json::to_string_pretty(&json).context("Failed to serialise output")?;
        return write_stdout(&text);
    }
    emit_markdown(&markdown, args.document.output.as_deref()).await
}

async fn run_insert_image(
    args: InsertImageArgs,
    progress: Option<ProgressCallback>,
    quiet: bool,
) -> Result<()> {
    let config = build_config(&args.upload, &args.style, progress)?;
    let session = open_session(&args.document, config).await?;

    let url = session
        .insert_image_from_path(&args.image)
        .await
        .with_context(|| format!("Failed to insert {}", args.image.display()))?;
    if !quiet && !args.document.json {
        eprintln!("{} {}", green("✔"), dim(&url));
    }

    let markdown = session.close();
    if args.document.json {
        let json = serde_json::json!({ "url": url, "markdown": markdown });
        let text = serde_json::to_string_pretty(&json).context("Failed to serialise output")?;
        return write_stdout(&text);
    }
    emit_markdown(&markdown, args.document.output.as_deref()).await
}

/// Map CLI args to `PipelineConfig`.
fn build_config(
    upload: &UploadArgs,
    style: &StyleArgs,
    progress: Option<ProgressCallback>,
) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .upload_timeout_secs(upload.upload_timeout)
        .max_retries(upload.max_retries)
        .retry_backoff_ms(upload.retry_backoff_ms)
        .markdown_style(MarkdownStyle::from(style));

    if let Some(ref url) = upload.upload_url {
        let uploader = HttpUploader::new(url, upload.upload_timeout)
            .context("Invalid upload endpoint")?
            .with_field_name(upload.upload_field.clone());
        builder = builder.uploader(Arc::new(uploader));
    }
    if let Some(n) = upload.concurrency {
        builder = builder.max_concurrent_uploads(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn open_session(
    args: &DocumentArgs,
    config: PipelineConfig,
) -> Result<EditorSession<MemoryDocument>> {
    let session = EditorSession::new(MemoryDocument::new(), config);
    if let Some(ref path) = args.seed {
        let stored = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read stored Markdown from {}", path.display()))?;
        session.seed(&stored);
    }
    Ok(session)
}

async fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

async fn emit_markdown(markdown: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let mut text = markdown.to_string();
            text.push('\n');
            tokio::fs::write(path, text)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
            Ok(())
        }
        None => write_stdout(markdown),
    }
}

fn write_stdout(text: &str) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    // Ensure a trailing newline on stdout.
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}
