//! Command-line front end: launches the browser, waits for the user to
//! bring up the track list, then hands control to the orchestrators.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tunegrab::{
    platforms, CdpCatalog, CertOrchestrator, Desktop, Orchestrator, OrchestratorConfig, StopToken,
    TracingSink,
};

const CDP_PORT: u16 = 9222;

#[derive(Parser, Debug)]
#[command(name = "tunegrab")]
#[command(about = "Template-matching bulk downloader for songs and certificates")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every catalog song's formats
    Songs(RunArgs),
    /// Download certificates for project folders that still miss one
    Certs(RunArgs),
    /// List monitors
    Monitors,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Monitor index to automate (see `monitors`)
    #[arg(short, long, default_value_t = 0)]
    monitor: usize,

    /// Maximum catalog rows to visit in one run
    #[arg(long, default_value_t = 50)]
    max_items: usize,

    /// Maximum scroll rounds before giving up
    #[arg(long, default_value_t = 15)]
    max_scrolls: usize,

    /// Page to open on launch
    #[arg(long, default_value = "https://www.tunee.ai")]
    url: String,

    /// Don't launch Chrome; attach to an already-running instance
    #[arg(long)]
    no_chrome: bool,

    /// Destination root for finished project folders
    #[arg(long)]
    library: Option<PathBuf>,

    /// Directory holding the template bitmaps
    #[arg(long, default_value = "templates")]
    templates: PathBuf,
}

fn build_config(args: &RunArgs) -> OrchestratorConfig {
    let mut config = OrchestratorConfig {
        monitor: args.monitor,
        max_items: args.max_items,
        max_scroll_rounds: args.max_scrolls,
        templates_dir: args.templates.clone(),
        ..OrchestratorConfig::default()
    };
    if let Some(library) = &args.library {
        config.library_root = library.clone();
    }
    config
}

fn chrome_binary() -> &'static str {
    if cfg!(target_os = "windows") {
        "chrome.exe"
    } else {
        "google-chrome"
    }
}

/// Launch Chrome with a dedicated profile and the remote-debugging port the
/// catalog scraper attaches to. Sessions persist in the profile, so a login
/// survives restarts.
fn launch_chrome(url: &str) -> Result<Child> {
    let profile = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("tunegrab")
        .join("chrome_profile");
    std::fs::create_dir_all(&profile)?;
    info!(url, "launching Chrome");
    ProcessCommand::new(chrome_binary())
        .arg(format!("--user-data-dir={}", profile.display()))
        .arg(format!("--remote-debugging-port={CDP_PORT}"))
        .args([
            "--no-first-run",
            "--no-default-browser-check",
            "--disable-popup-blocking",
            "--window-size=1920,1080",
        ])
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("failed to launch Chrome")
}

fn wait_for_enter(prompt: &str) -> Result<()> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

fn stop_on_ctrl_c() -> StopToken {
    let stop = StopToken::new();
    let handle = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop requested, finishing the current row");
            handle.stop();
        }
    });
    stop
}

fn list_monitors() -> Result<()> {
    let engine = platforms::create_engine()?;
    for m in engine.list_monitors()? {
        let primary = if m.is_primary { " (primary)" } else { "" };
        println!(
            "  {}: {} {}x{} @ ({}, {}){}",
            m.index, m.name, m.width, m.height, m.x, m.y, primary
        );
    }
    Ok(())
}

async fn run_songs(args: RunArgs) -> Result<()> {
    let config = build_config(&args);
    let desktop = Desktop::new(config.monitor)?;
    let _chrome = if args.no_chrome {
        None
    } else {
        Some(launch_chrome(&args.url)?)
    };
    wait_for_enter("Press Enter when the song list is visible... ")?;

    let stop = stop_on_ctrl_c();
    let catalog = Arc::new(CdpCatalog::new(
        config.cdp_url.clone(),
        config.page_host.clone(),
    ));
    let orchestrator =
        Orchestrator::new(desktop, catalog, config).with_events(Arc::new(TracingSink));
    let summary = orchestrator.run(&stop).await?;
    info!(
        completed = summary.completed,
        duplicates = summary.duplicates,
        failures = summary.failures,
        "song run finished"
    );
    Ok(())
}

async fn run_certs(args: RunArgs) -> Result<()> {
    let config = build_config(&args);
    let desktop = Desktop::new(config.monitor)?;
    let _chrome = if args.no_chrome {
        None
    } else {
        Some(launch_chrome(&args.url)?)
    };
    wait_for_enter("Press Enter when the song list is visible... ")?;

    let stop = stop_on_ctrl_c();
    let catalog = Arc::new(CdpCatalog::new(
        config.cdp_url.clone(),
        config.page_host.clone(),
    ));
    let orchestrator =
        CertOrchestrator::new(desktop, catalog, config).with_events(Arc::new(TracingSink));
    let summary = orchestrator.run(&stop).await?;
    info!(
        completed = summary.completed,
        duplicates = summary.duplicates,
        failures = summary.failures,
        "certificate run finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Songs(args) => run_songs(args).await,
        Command::Certs(args) => run_certs(args).await,
        Command::Monitors => list_monitors(),
    }
}
