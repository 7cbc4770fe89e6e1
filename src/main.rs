use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod aggregate;
mod config;
mod error;
mod fanout;
mod icinga;
mod mailer;
mod models;
mod recipients;
mod render;
mod sequence;
mod source;

use crate::config::{AppConfig, LogConfig};
use crate::error::IntegrityError;
use crate::fanout::NotificationDigest;
use crate::models::{HostAggregate, Snapshot};
use crate::render::DigestRenderer;
use crate::source::ProblemSource;

#[derive(Parser)]
#[command(name = "icinga-email-summary")]
#[command(about = "Mail every Icinga user one digest of the open problems on their hosts", long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch open problems and mail each recipient their digest
    Send {
        /// Read backend objects from a JSON capture instead of the API
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Render digests but do not send them
        #[arg(long)]
        dry_run: bool,
    },
    /// List the digests a run would send, optionally writing the HTML
    Preview {
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Directory to write one `<address>.html` per recipient into
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    init_tracing(&config.log)?;
    tracing::info!("Creating Icinga email summary...");

    match cli.command {
        Commands::Send { snapshot, dry_run } => {
            if dry_run {
                config.mail.send = false;
            }

            let snapshot = fetch(&config, snapshot.as_deref()).await?;
            let ordered = ordered_problems(&snapshot, &Local::now())?;
            let digest = fanout::fanout(&ordered, &snapshot.users)?;
            tracing::info!(hosts = ordered.len(), recipients = digest.len(), "Digests built.");

            let renderer = renderer(&config)?;
            let transport = mailer::SmtpMailer::new(&config.smtp, &config.mail.from)
                .context("failed to set up SMTP transport")?;
            let summary = mailer::dispatch(&digest, &renderer, &transport, &config.mail).await;

            println!(
                "Sent {} digests ({} skipped, {} failed).",
                summary.sent, summary.skipped, summary.failed
            );
        }
        Commands::Preview { snapshot, out } => {
            let snapshot = fetch(&config, snapshot.as_deref()).await?;
            let ordered = ordered_problems(&snapshot, &Local::now())?;
            let digest = fanout::fanout(&ordered, &snapshot.users)?;

            if digest.is_empty() {
                println!("No recipients to notify.");
                return Ok(());
            }

            println!("Digests by recipient:");
            for entry in digest.iter() {
                println!("- {} ({} hosts)", entry.address, entry.hosts.len());
                for host in entry.hosts.iter() {
                    let state = render::HOST_STATES
                        .get(usize::from(host.severity_state))
                        .unwrap_or(&"?");
                    let origin = if host.is_host_problem() { "host" } else { "services" };
                    println!(
                        "    {} [{} via {}] {} services, changed {}",
                        host.display_name,
                        state,
                        origin,
                        host.services.len(),
                        host.change_time_display
                    );
                }
            }

            if let Some(out) = out {
                let renderer = renderer(&config)?;
                std::fs::create_dir_all(&out)
                    .with_context(|| format!("failed to create {}", out.display()))?;
                let written = write_previews(&out, &digest, &renderer);
                println!("{} of {} digests written to {}.", written, digest.len(), out.display());
            }
        }
    }

    Ok(())
}

/// Aggregates the snapshot and puts the hosts in notification order.
fn ordered_problems(
    snapshot: &Snapshot,
    now: &DateTime<Local>,
) -> Result<Vec<HostAggregate>, IntegrityError> {
    let aggregates = aggregate::aggregate(&snapshot.hosts, &snapshot.services, now)?;
    Ok(sequence::order(aggregates.into_values()))
}

/// Writes one HTML file per recipient into `out`. A recipient whose digest
/// cannot be rendered or written is logged and skipped.
fn write_previews(out: &Path, digest: &NotificationDigest<'_>, renderer: &DigestRenderer) -> usize {
    let mut written = 0;

    for entry in digest.iter() {
        let path = out.join(preview_file_name(&entry.address));
        let result = renderer
            .render(&entry.hosts)
            .map_err(anyhow::Error::from)
            .and_then(|html| std::fs::write(&path, html).map_err(anyhow::Error::from));

        match result {
            Ok(()) => written += 1,
            Err(err) => {
                tracing::error!(recipient = %entry.address, path = %path.display(), error = %err, "Could not write preview.");
            }
        }
    }

    written
}

// Addresses come from backend user data; keep them to a single plain path
// component.
fn preview_file_name(address: &str) -> String {
    let stem: String = address
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '@' | '.' | '_' | '+' | '-' => c,
            _ => '_',
        })
        .collect();
    format!("{}.html", stem.trim_start_matches('.'))
}

async fn fetch(config: &AppConfig, snapshot: Option<&Path>) -> anyhow::Result<Snapshot> {
    let source: Box<dyn ProblemSource> = match snapshot {
        Some(path) => Box::new(source::SnapshotFile::new(path)),
        None => Box::new(icinga::IcingaClient::new(&config.icinga)?),
    };

    source
        .fetch()
        .await
        .context("failed to fetch problems from the monitoring backend")
}

fn renderer(config: &AppConfig) -> anyhow::Result<DigestRenderer> {
    let renderer = match &config.template {
        Some(path) => {
            let template = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read template {}", path.display()))?;
            DigestRenderer::with_template(template, config.colors.clone(), &config.mail.subject)?
        }
        None => DigestRenderer::new(config.colors.clone(), &config.mail.subject)?,
    };
    Ok(renderer)
}

fn init_tracing(log: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&log.level))?;

    match &log.file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}
