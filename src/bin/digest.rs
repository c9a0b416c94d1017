//! Digest binary entry point.
//!
//! Searches NASA ADS for recent papers, ranks them against the configured
//! research interests and mails the digest. Without SMTP settings (or with
//! `--dry-run`) the digest is printed instead.
//!
//! # Examples
//!
//! Send today's digest:
//! ```bash
//! ADS_API_KEY=... SENDER_EMAIL=... SENDER_PASSWORD=... RECIPIENT_EMAIL=... digest
//! ```
//!
//! Preview the last week as a table:
//! ```bash
//! digest --days-back 7 --dry-run
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use astro_digest::{
    build_digest,
    config::DigestConfig,
    digest::Digest,
    mailer::{Mailer, SmtpMailer},
    models::{RelevanceTier, ScoredPaper},
    provider::ads::AdsClient,
    render::Renderer,
    DateWindow, IngestionStats,
};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for dry runs
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Ranked table with colored tiers, followed by the summary
    Table,
    /// Machine-readable JSON (digest and ingestion statistics)
    Json,
    /// The plain-text mail body
    Text,
}

/// Astro-ph digest CLI
#[derive(Parser, Debug)]
#[command(
    name = "digest",
    version,
    about = "Mail a relevance-ranked digest of recent astro-ph papers",
    long_about = "Query NASA ADS for recent papers in the configured arXiv classes, score them against \
                  your research interests and send the ranked digest by email.

EXAMPLES:
  Send the daily digest:
    digest

  Preview the last week without sending:
    digest --days-back 7 --dry-run

  JSON output with an extra config file:
    digest --config interests.toml --dry-run --format json"
)]
struct DigestArgs {
    /// Extra TOML configuration file, layered over astro-digest.toml
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Size of the date window in days (overrides configuration)
    #[arg(long, value_name = "N")]
    days_back: Option<u32>,

    /// Print the digest instead of sending it
    #[arg(long)]
    dry_run: bool,

    /// Dry-run output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Logging verbosity level (used when RUST_LOG is unset)
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    log_level: String,
}

/// Initialize logging subsystem with the specified level
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Load configuration and apply command-line overrides
fn load_config(args: &DigestArgs) -> Result<DigestConfig> {
    let mut config =
        DigestConfig::load_with_dotenv(args.config.as_deref()).context("Failed to load configuration")?;

    if let Some(days_back) = args.days_back {
        config.days_back = days_back;
        config.validate().context("Invalid --days-back")?;
    }

    Ok(config)
}

fn create_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

/// Format the ranked digest as a table
fn format_digest_table(digest: &Digest) -> String {
    if digest.is_empty() {
        return "0 papers found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Tier").add_attribute(Attribute::Bold),
        Cell::new("Score").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Category").add_attribute(Attribute::Bold),
        Cell::new("Date").add_attribute(Attribute::Bold),
    ]);

    for (idx, scored) in digest.papers.iter().enumerate() {
        table.add_row(paper_row(idx, scored));
    }

    let mut out = table.to_string();
    out.push('\n');
    out.push_str(&digest.summary());
    if digest.omitted > 0 {
        out.push_str(&format!("\n{} more papers not shown", digest.omitted));
    }
    out
}

fn paper_row(idx: usize, scored: &ScoredPaper) -> Vec<Cell> {
    let paper = &scored.paper;
    let authors = paper.author_names().collect::<Vec<_>>().join(", ");

    // Color-code tiers
    let color = match scored.tier {
        RelevanceTier::VeryRelevant => Color::Red,
        RelevanceTier::Relevant => Color::Yellow,
        RelevanceTier::SomewhatRelevant => Color::Cyan,
        RelevanceTier::General => Color::White,
    };
    let mut tier = Cell::new(scored.tier.label()).fg(color);
    if scored.is_priority_author {
        tier = tier.add_attribute(Attribute::Bold);
    }

    vec![
        Cell::new(idx + 1),
        tier,
        Cell::new(scored.score),
        Cell::new(truncate_chars(&paper.title, 60)),
        Cell::new(truncate_chars(&authors, 40)),
        Cell::new(&paper.category),
        Cell::new(
            paper
                .published_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
        ),
    ]
}

/// Format the digest and statistics as JSON
fn format_digest_json(digest: &Digest, stats: &IngestionStats, window: &DateWindow) -> Result<String> {
    let value = json!({
        "window": { "start": window.start, "end": window.end },
        "summary": digest.summary(),
        "stats": stats,
        "digest": digest,
    });
    serde_json::to_string_pretty(&value).context("Failed to serialize digest to JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = DigestArgs::parse();
    init_logging(&args.log_level);

    info!("Starting astro-ph digest");
    debug!("CLI arguments: {:?}", args);

    let start_time = Instant::now();
    let config = load_config(&args)?;

    let dry_run = args.dry_run || !config.smtp.is_configured();
    if !args.dry_run && dry_run {
        warn!("SMTP settings are incomplete; printing the digest instead of sending it");
    }

    let window = DateWindow::ending_today(config.days_back);
    info!("Date window: {}", window.display());

    let client = AdsClient::new(&config.ads).context("Failed to create ADS client")?;

    let spinner = create_spinner();
    spinner.set_message(format!("Querying NASA ADS for {}...", window.ads_range()));
    let result = build_digest(&config, client, &window).await;
    spinner.finish_and_clear();
    let (digest, stats) = result.context("Failed to collect papers")?;

    info!(
        "Collected {} papers ({} duplicates merged, {} malformed dropped, {} failed queries)",
        stats.unique_papers, stats.duplicates_merged, stats.malformed_dropped, stats.queries_failed
    );
    if stats.records_truncated > 0 {
        warn!(
            "{} matching records were not fetched because of ads.max_records; the digest is incomplete",
            stats.records_truncated
        );
    }

    let mut renderer = Renderer::new(&config.presentation);
    if let Some(institution) = &config.interests.institution {
        renderer = renderer.with_institution(institution.name.clone());
    }
    let rendered = renderer.render(&digest, &window).context("Failed to render digest")?;

    if dry_run {
        match args.format {
            OutputFormat::Table => {
                println!("{}", format_digest_table(&digest));
                if stats.records_truncated > 0 {
                    println!("{} more matching records were not fetched (ads.max_records)", stats.records_truncated);
                }
                println!("\nSubject: {}\n", rendered.subject);
                println!("{}", rendered.text);
            }
            OutputFormat::Json => println!("{}", format_digest_json(&digest, &stats, &window)?),
            OutputFormat::Text => {
                println!("Subject: {}\n", rendered.subject);
                println!("{}", rendered.text);
            }
        }
    } else {
        let mailer = SmtpMailer::from_config(&config.smtp).context("Invalid SMTP configuration")?;
        mailer.send(&rendered).await.context("Failed to send digest")?;
        info!("Sent: {}", rendered.subject);
    }

    info!("Finished in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}
