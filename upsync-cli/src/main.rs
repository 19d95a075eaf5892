use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use upsync_core::{SyncConfig, SyncEngine, CONFIG_FILE_NAME};
use upsync_remote_sftp::SftpConnector;

#[derive(Parser)]
#[command(name = "upsync", version, about = "upsync – mirror a local directory to a remote host over SFTP")]
struct Cli {
    /// Path to config file (JSON, or YAML by extension)
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Show the pending queues instead of only logging
    #[arg(long)]
    console: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Write a template config file to fill in
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Some(Command::Init) = cli.command {
        return init(&cli.config);
    }

    if !cli.config.exists() {
        return Err(anyhow!(
            "no configuration file found at {}; run `upsync init` to create one",
            cli.config.display()
        ));
    }
    let cfg = SyncConfig::load(&cli.config)?;
    cfg.validate().context("invalid config")?;

    println!("Loaded configuration:");
    println!("  Local:  {}", cfg.local_dir.display());
    println!("  Remote: {}@{}:{}", cfg.user, cfg.host, cfg.remote_dir);
    println!("  Auth:   {:?}", cfg.auth_type);

    let engine = SyncEngine::start(&cfg, Arc::new(SftpConnector::new())).await?;
    info!(root = %engine.local_root().display(), state = %engine.connection_state(), "engine started");

    if cli.console {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = tick.tick() => render(&engine)?,
            }
        }
    } else {
        println!("upsync running... press Ctrl+C to stop");
        tokio::signal::ctrl_c().await?;
    }

    println!("Stopping");
    engine.shutdown().await?;
    Ok(())
}

fn init(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(anyhow!("{} already exists", path.display()));
    }
    SyncConfig::template().save(path)?;
    println!("Wrote {}; fill in host, user, remoteDir and credentials.", path.display());
    Ok(())
}

fn render(engine: &SyncEngine) -> Result<()> {
    let mut out = std::io::stdout().lock();
    // Clear screen, cursor home.
    write!(out, "\x1b[2J\x1b[H")?;
    writeln!(out, "Connection: {}", engine.connection_state())?;
    writeln!(out, "\nUpload queue:")?;
    for path in engine.uploads() {
        writeln!(out, "  {}", path.display())?;
    }
    writeln!(out, "\nDelete queue:")?;
    for path in engine.deletes() {
        writeln!(out, "  {}", path.display())?;
    }
    out.flush()?;
    Ok(())
}
