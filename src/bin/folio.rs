//! CLI binary for folio-kit.
//!
//! A thin shim over the library: render blog markup, crop (and optionally
//! upload) an image through the intake pipeline, upload a CV document.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use folio_kit::{
    intake::IntakeSession, markup, rasterize, store_document, validate_file, ContentRepository,
    CropRegion, DisplaySize, IntakeCallback, IntakeConfig, IntakeError, Phase, RestStore,
    SelectedFile, StoreConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI spinner driven by intake callbacks ───────────────────────────────────

struct SpinnerCallback {
    bar: ProgressBar,
    quiet: bool,
}

impl SpinnerCallback {
    fn new(quiet: bool) -> Arc<Self> {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
            bar.set_style(style);
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        };
        bar.set_prefix("Intake");
        Arc::new(Self { bar, quiet })
    }
}

impl IntakeCallback for SpinnerCallback {
    fn on_complete(&self, url: &str) {
        self.bar.finish_and_clear();
        if !self.quiet {
            eprintln!("{} uploaded {}", green("✓"), dim(url));
        }
    }

    // The error itself is reported by `main`.
    fn on_error(&self, error: &IntakeError) {
        self.bar.finish_and_clear();
        if !self.quiet {
            eprintln!("{} {:?} attempt failed", red("✗"), error.kind());
        }
    }

    fn on_phase_change(&self, _from: Phase, to: Phase) {
        let msg = match to {
            Phase::Validating => "Checking file…",
            Phase::Cropping => "Preparing crop…",
            Phase::Rasterizing => "Encoding JPEG…",
            Phase::Uploading => "Uploading…",
            Phase::Done | Phase::Idle => return,
        };
        self.bar.set_message(msg);
    }
}

// ── Arguments ────────────────────────────────────────────────────────────────

/// Portfolio content tools: blog markup rendering, image intake, CV upload.
#[derive(Parser, Debug)]
#[command(name = "folio", version, arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "FOLIO_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "FOLIO_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render blog markup to sanitized HTML.
    Render {
        /// Markup file; reads stdin when omitted.
        file: Option<PathBuf>,

        /// Print the unsanitized fragment instead.
        #[arg(long)]
        raw: bool,
    },

    /// Crop an image to a JPEG, locally or straight to the blob store.
    Crop(CropArgs),

    /// Upload a PDF as the site's CV and print its public URL.
    UploadCv {
        file: PathBuf,

        /// Also set `cv_url` on this site-info row.
        #[arg(long)]
        info_id: Option<String>,

        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Args, Debug)]
struct CropArgs {
    image: PathBuf,

    #[arg(long, default_value_t = 0.0)]
    x: f64,

    #[arg(long, default_value_t = 0.0)]
    y: f64,

    #[arg(long)]
    width: f64,

    /// Derived from the width and aspect ratio when omitted.
    #[arg(long)]
    height: Option<f64>,

    #[arg(long, value_enum, default_value = "px")]
    unit: UnitArg,

    /// Aspect ratio as W:H or a decimal.
    #[arg(long, default_value = "16:9", value_parser = parse_aspect)]
    aspect: f64,

    /// Size the image was displayed at, as WxH. Defaults to natural size.
    #[arg(long, value_parser = parse_display)]
    display: Option<DisplaySize>,

    /// JPEG quality (1–100).
    #[arg(long, env = "FOLIO_JPEG_QUALITY", default_value_t = 95)]
    quality: u8,

    /// Output file when not uploading.
    #[arg(short, long, default_value = "cropped-image.jpg")]
    output: PathBuf,

    /// Upload instead of writing a local file.
    #[arg(long)]
    upload: bool,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args, Debug)]
struct StoreArgs {
    #[arg(long, env = StoreConfig::ENV_URL)]
    store_url: Option<String>,

    #[arg(long, env = StoreConfig::ENV_KEY, hide_env_values = true)]
    store_key: Option<String>,

    #[arg(long, env = StoreConfig::ENV_BUCKET, default_value = "images")]
    bucket: String,

    /// Per-request timeout in seconds.
    #[arg(long, env = StoreConfig::ENV_TIMEOUT, default_value_t = 30)]
    store_timeout: u64,
}

impl StoreArgs {
    fn config(&self) -> Result<StoreConfig> {
        let url = self
            .store_url
            .clone()
            .ok_or_else(|| anyhow!("--store-url or {} is required", StoreConfig::ENV_URL))?;
        let key = self
            .store_key
            .clone()
            .ok_or_else(|| anyhow!("--store-key or {} is required", StoreConfig::ENV_KEY))?;
        Ok(StoreConfig::builder(url, key)
            .bucket(&self.bucket)
            .timeout_secs(self.store_timeout)
            .build()?)
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum UnitArg {
    Px,
    Percent,
}

fn parse_aspect(s: &str) -> Result<f64, String> {
    let ratio = match s.split_once(':') {
        Some((w, h)) => {
            let w: f64 = w.trim().parse().map_err(|_| format!("bad width in '{s}'"))?;
            let h: f64 = h.trim().parse().map_err(|_| format!("bad height in '{s}'"))?;
            w / h
        }
        None => s.trim().parse().map_err(|_| format!("'{s}' is not a ratio"))?,
    };
    if ratio.is_finite() && ratio > 0.0 {
        Ok(ratio)
    } else {
        Err(format!("aspect ratio '{s}' must be positive"))
    }
}

fn parse_display(s: &str) -> Result<DisplaySize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got '{s}'"))?;
    let w: f64 = w.trim().parse().map_err(|_| format!("bad width in '{s}'"))?;
    let h: f64 = h.trim().parse().map_err(|_| format!("bad height in '{s}'"))?;
    Ok(DisplaySize::new(w, h))
}

// ── Commands ─────────────────────────────────────────────────────────────────

fn run_render(file: Option<PathBuf>, raw: bool) -> Result<()> {
    let text = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            buf
        }
    };
    let html = if raw {
        markup::render(&text)
    } else {
        markup::render_safe(&text)
    };
    let mut out = io::stdout().lock();
    writeln!(out, "{}", html)?;
    Ok(())
}

fn crop_region(args: &CropArgs) -> CropRegion {
    let height = args.height.unwrap_or(args.width / args.aspect);
    let region = match args.unit {
        UnitArg::Px => CropRegion::pixels(args.x, args.y, args.width, height),
        UnitArg::Percent => CropRegion::percent(args.x, args.y, args.width, height),
    };
    if args.height.is_none() {
        region.with_aspect(args.aspect)
    } else {
        region
    }
}

async fn run_crop(args: CropArgs, quiet: bool) -> Result<()> {
    let file = SelectedFile::from_path(&args.image)
        .await
        .with_context(|| format!("Failed to read {}", args.image.display()))?;
    let region = crop_region(&args);
    let config = IntakeConfig::builder()
        .aspect_ratio(args.aspect)
        .jpeg_quality(args.quality)
        .bucket(&args.store.bucket)
        .build()?;

    if !args.upload {
        validate_file(&file, &config)?;
        let (display, quality) = (args.display, config.jpeg_quality);
        let image = tokio::task::spawn_blocking(move || rasterize(file.bytes(), &region, display, quality))
            .await
            .context("Rasterization task failed")??;
        std::fs::write(&args.output, &image.bytes)
            .with_context(|| format!("Failed to write {}", args.output.display()))?;
        if !quiet {
            eprintln!(
                "{} {}x{} → {}",
                green("✓"),
                image.width,
                image.height,
                args.output.display()
            );
        }
        return Ok(());
    }

    let store = Arc::new(RestStore::new(&args.store.config()?)?);
    let callback = SpinnerCallback::new(quiet);
    let mut session = IntakeSession::new(config, store, callback);
    session.select_file(file)?;
    session.set_crop(region)?;
    let asset = session.confirm(args.display).await?;
    println!("{}", asset.public_url);
    Ok(())
}

async fn run_upload_cv(file: PathBuf, info_id: Option<String>, store: StoreArgs, quiet: bool) -> Result<()> {
    let config = store.config()?;
    let rest = Arc::new(RestStore::new(&config)?);
    let selected = SelectedFile::from_path(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let asset = store_document(rest.as_ref(), &config.bucket, &selected).await?;
    if let Some(id) = info_id {
        ContentRepository::new(rest)
            .set_cv_url(&id, &asset.public_url)
            .await
            .context("CV uploaded but the site info could not be updated")?;
        if !quiet {
            eprintln!("{} cv_url updated on {}", green("✓"), id);
        }
    }
    println!("{}", asset.public_url);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Render { file, raw } => run_render(file, raw),
        Command::Crop(args) => {
            if args.width <= 0.0 {
                bail!("--width must be positive");
            }
            run_crop(args, cli.quiet).await
        }
        Command::UploadCv {
            file,
            info_id,
            store,
        } => run_upload_cv(file, info_id, store, cli.quiet).await,
    }
}
