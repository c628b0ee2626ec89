use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand};
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::{error, info};

use camlapse::{
    CamlapseConfig, CaptureOrchestrator, FrameSelector, ImageCatalog, TimelapseAssembler,
    TimelapseOptions, WebcamScraper, DEFAULT_FRAMERATE,
};

#[derive(Parser, Debug)]
#[command(name = "camlapse")]
#[command(about = "Webcam frame scraper with a timestamp-indexed catalog and timelapse assembly")]
#[command(version)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "camlapse.toml")]
    config: String,

    /// Enable debug level logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose info level logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Capture one frame from every listed webcam
    Scrape {
        /// Only capture these camera slugs
        #[arg(long = "only", value_name = "SLUG")]
        only: Vec<String>,

        /// Skip these camera slugs
        #[arg(long = "exclude", value_name = "SLUG")]
        exclude: Vec<String>,
    },

    /// Capture frames on the configured interval until stopped
    Run,

    /// Migrate the legacy flat image layout into date partitions
    Migrate,

    /// Assemble timelapse videos from catalogued frames
    Timelapse(TimelapseArgs),

    /// Print the default configuration in TOML format and exit
    PrintConfig,
}

#[derive(Args, Debug)]
struct TimelapseArgs {
    /// Camera slug, or "all" for every camera on the portal
    #[arg(long)]
    camera: String,

    /// Start of the range, inclusive (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[arg(long)]
    from_date: String,

    /// End of the range, inclusive (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)
    #[arg(long)]
    to_date: String,

    /// Playback rate of the resulting video in frames per second
    #[arg(long, default_value_t = DEFAULT_FRAMERATE)]
    framerate: u32,

    /// Burn each frame's capture time into the video
    #[arg(long)]
    include_timestamp: bool,

    #[command(subcommand)]
    mode: TimelapseMode,
}

#[derive(Subcommand, Debug)]
enum TimelapseMode {
    /// Use every saved frame in the range
    All,

    /// Use frames from a given hour each day
    Daily {
        /// Local hour of day to pick frames from
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=23))]
        hour: u32,

        /// Frames to keep per day
        #[arg(long, default_value = "1")]
        frames: NonZeroUsize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    if matches!(cli.command, Command::PrintConfig) {
        print!("{}", toml::to_string_pretty(&CamlapseConfig::default())?);
        return Ok(());
    }

    let config = CamlapseConfig::load_from_file(&cli.config)?;

    match cli.command {
        Command::Scrape { only, exclude } => scrape(&config, &only, &exclude).await?,
        Command::Run => run(&config).await?,
        Command::Migrate => {
            let catalog = open_catalog(&config)?;
            let migrated = camlapse::migrate_flat_layout(&config, &catalog)?;
            println!("Migrated {} frames", migrated);
        }
        Command::Timelapse(args) => timelapse(&config, &args).await?,
        Command::PrintConfig => unreachable!("handled above"),
    }

    Ok(())
}

/// Open the catalog (lazily creating its schema) and fold in a catalog a
/// parallel migration process may have left behind.
fn open_catalog(config: &CamlapseConfig) -> Result<ImageCatalog> {
    let catalog = ImageCatalog::open(&config.output_path, config.timezone)?;
    catalog.merge_pending(&config.migration_db_path())?;
    Ok(catalog)
}

async fn scrape(config: &CamlapseConfig, only: &[String], exclude: &[String]) -> Result<()> {
    let catalog = open_catalog(config)?;
    let orchestrator = CaptureOrchestrator::new(config, &catalog);
    let mut scraper = WebcamScraper::new(&config.user_agent)?;

    let cameras = scraper.list_cameras().await?;
    let captured = orchestrator
        .capture_all(&mut scraper, &cameras, only, exclude)
        .await;
    info!("Capture round complete: {}/{} cameras", captured, cameras.len());
    Ok(())
}

async fn run(config: &CamlapseConfig) -> Result<()> {
    let catalog = open_catalog(config)?;
    let orchestrator = CaptureOrchestrator::new(config, &catalog);
    let mut scraper = WebcamScraper::new(&config.user_agent)?;

    info!(
        "Capturing every {}s into {}",
        config.interval_seconds,
        config.output_path.display()
    );
    let mut ticker = tokio::time::interval(Duration::from_secs(config.interval_seconds));
    loop {
        ticker.tick().await;
        // Camera and stream lookups live for exactly one round.
        scraper.invalidate();
        match scraper.list_cameras().await {
            Ok(cameras) => {
                let captured = orchestrator
                    .capture_all(&mut scraper, &cameras, &[], &[])
                    .await;
                info!("Capture round complete: {}/{} cameras", captured, cameras.len());
            }
            Err(e) => error!("Could not list cameras, skipping round: {}", e),
        }
    }
}

async fn timelapse(config: &CamlapseConfig, args: &TimelapseArgs) -> Result<()> {
    let catalog = open_catalog(config)?;
    let assembler = TimelapseAssembler::new(&catalog);

    let from = parse_local_datetime(&args.from_date, config.timezone)?;
    let to = parse_local_datetime(&args.to_date, config.timezone)?;
    let selector = match args.mode {
        TimelapseMode::All => FrameSelector::All,
        TimelapseMode::Daily { hour, frames } => FrameSelector::daily(hour, frames),
    };

    let cameras: Vec<String> = if args.camera == "all" {
        WebcamScraper::new(&config.user_agent)?
            .list_cameras()
            .await?
            .into_iter()
            .map(|camera| camera.slug)
            .collect()
    } else {
        vec![args.camera.clone()]
    };

    for camera in cameras {
        let options = TimelapseOptions {
            camera,
            from,
            to,
            output_dir: config.timelapse_path.clone(),
            framerate: args.framerate,
            include_timestamp: args.include_timestamp,
        };
        let output = assembler.create(&options, &selector).await?;
        println!("{}", output.display());
    }
    Ok(())
}

/// Accept a bare date (midnight) or a full local datetime, interpreted in
/// the configured timezone.
fn parse_local_datetime(value: &str, tz: Tz) -> Result<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").or_else(|_| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map(|date| {
            date.and_hms_opt(0, 0, 0)
                .expect("midnight is a valid wall time")
        })
    })?;
    tz.from_local_datetime(&naive)
        .single()
        .ok_or_else(|| anyhow!("'{}' is ambiguous or nonexistent in {}", value, tz))
}

fn init_logging(cli: &Cli) {
    use tracing_subscriber::EnvFilter;

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camlapse={}", level)));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::St_Johns;

    #[test]
    fn test_parse_bare_date_is_local_midnight() {
        let parsed = parse_local_datetime("2024-01-01", St_Johns).unwrap();
        assert_eq!(parsed, St_Johns.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_full_datetime() {
        let parsed = parse_local_datetime("2024-01-01T10:05:00", St_Johns).unwrap();
        assert_eq!(
            parsed,
            St_Johns.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_local_datetime("yesterday", St_Johns).is_err());
    }

    #[test]
    fn test_cli_parses_timelapse_daily() {
        let cli = Cli::parse_from([
            "camlapse",
            "timelapse",
            "--camera",
            "downtown",
            "--from-date",
            "2024-01-01",
            "--to-date",
            "2024-01-02",
            "--include-timestamp",
            "daily",
            "--hour",
            "10",
            "--frames",
            "3",
        ]);
        let Command::Timelapse(args) = cli.command else {
            panic!("expected timelapse command");
        };
        assert_eq!(args.framerate, DEFAULT_FRAMERATE);
        assert!(args.include_timestamp);
        let TimelapseMode::Daily { hour, frames } = args.mode else {
            panic!("expected daily mode");
        };
        assert_eq!(hour, 10);
        assert_eq!(frames.get(), 3);
    }

    #[test]
    fn test_cli_rejects_zero_frame_stride() {
        let result = Cli::try_parse_from([
            "camlapse",
            "timelapse",
            "--camera",
            "downtown",
            "--from-date",
            "2024-01-01",
            "--to-date",
            "2024-01-02",
            "daily",
            "--hour",
            "10",
            "--frames",
            "0",
        ]);
        assert!(result.is_err());
    }
}
