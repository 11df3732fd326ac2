//! Lesson scraper CLI
//!
//! Local execution entry point.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lesson_scraper::{
    ItemTarget, ScrapeSession,
    error::{AppError, Result},
    models::{Config, ItemFilters, QualityTier, ScrapeMode, Stage},
    storage::{DocumentStorage, LocalStorage, Manifest, ManifestEntry},
};
use serde::Serialize;

/// Lesson scraper - course pages to PDF documents
#[derive(Parser, Debug)]
#[command(
    name = "lesson-scraper",
    version,
    about = "Scrape course lessons and assemble them into PDF documents"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "lesson-scraper.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape a course page and summarize its groups
    Scrape {
        /// Course page URL
        url: String,

        /// preview or download (download keeps only selected lessons)
        #[arg(long, default_value = "preview")]
        mode: ScrapeMode,

        /// Keep only lessons that carry a video
        #[arg(long)]
        only_with_video: bool,

        /// Keep lessons that have no material images
        #[arg(long)]
        include_without_images: bool,

        /// Write the scrape result as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Scrape a course page and assemble PDFs for the chosen groups
    Download {
        /// Course page URL
        url: String,

        /// Image quality: 120p, 320p or 480p
        #[arg(short, long, default_value = "320p")]
        quality: QualityTier,

        /// Group to download (repeatable; all groups when omitted)
        #[arg(short, long = "group")]
        groups: Vec<String>,

        /// Output directory (default: scraped/<timestamp>)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Scan a numeric range of lesson URLs for video lessons
    Sweep {
        /// Lesson URL template containing `{id}`
        #[arg(long)]
        template: String,

        /// First id (inclusive)
        #[arg(long)]
        from: u64,

        /// Last id (inclusive)
        #[arg(long)]
        to: u64,

        /// Links per batch
        #[arg(long, default_value_t = 1)]
        batch_size: usize,

        /// Write found lessons as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Cancel the session's active run on Ctrl-C.
fn cancel_on_interrupt(session: &Arc<ScrapeSession>) {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling...");
            session.cancel();
        }
    });
}

/// Log progress snapshots as they are published.
fn report_progress(session: &ScrapeSession) {
    let mut rx = session.subscribe();
    tokio::spawn(async move {
        while let Ok(status) = rx.recv().await {
            if let Some(progress) = &status.progress {
                log::debug!(
                    "[{}/{}] {}",
                    progress.current,
                    progress.total,
                    status.message
                );
            }
            if status.stage.is_terminal() {
                break;
            }
        }
    });
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, json).await?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn default_output_dir() -> PathBuf {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    PathBuf::from("scraped").join(stamp.to_string())
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = if cli.config.exists() {
        let config = Config::load(&cli.config)?;
        log::info!("Loaded configuration from {}", cli.config.display());
        config
    } else {
        log::debug!("{} not found, using defaults", cli.config.display());
        Config::default()
    };

    if let Command::Validate = cli.command {
        log::info!("Validating configuration...");
        if let Err(e) = config.validate() {
            log::error!("Config validation failed: {}", e);
            return Err(e);
        }
        log::info!("✓ Config OK");
        return Ok(());
    }

    let session = Arc::new(ScrapeSession::from_config(config)?);
    cancel_on_interrupt(&session);
    report_progress(&session);

    match cli.command {
        Command::Scrape {
            url,
            mode,
            only_with_video,
            include_without_images,
            json,
        } => {
            session.set_filters(ItemFilters {
                only_with_video,
                only_with_images: !include_without_images,
            });
            let result = session.start(&url, mode).await?;

            for group in &result.groups {
                let videos = group.items.iter().filter(|i| i.has_video).count();
                log::info!(
                    "{}: {} lessons, {} with video, {:.1} MiB of images",
                    group.name,
                    group.items.len(),
                    videos,
                    group.items.iter().map(|i| i.total_size()).sum::<u64>() as f64
                        / (1024.0 * 1024.0)
                );
            }
            log::info!(
                "{} lessons in {} groups",
                result.item_count(),
                result.groups.len()
            );

            if let Some(path) = json {
                write_json(&path, &result).await?;
            }
        }

        Command::Download {
            url,
            quality,
            groups,
            output,
        } => {
            let result = session.start(&url, ScrapeMode::Preview).await?;

            if groups.is_empty() {
                session.select_all(true);
            } else {
                for name in &groups {
                    if result.group(name).is_none() {
                        return Err(AppError::validation(format!(
                            "group {name:?} not found; available: {}",
                            result.group_names().join(", ")
                        )));
                    }
                    session.set_selection(name, ItemTarget::All, true);
                }
            }

            let documents = session.materialize(quality).await?;

            let storage = LocalStorage::new(output.unwrap_or_else(default_output_dir));
            let mut manifest = Manifest::new(quality);
            for doc in &documents {
                let path = storage.write_document(&doc.group, &doc.document).await?;
                let file = path
                    .strip_prefix(storage.root())
                    .unwrap_or(&path)
                    .display()
                    .to_string();
                manifest.documents.push(ManifestEntry {
                    group: doc.group.clone(),
                    lesson: doc.lesson.clone(),
                    file,
                    pages: doc.document.pages,
                    skipped: doc.document.skipped.clone(),
                });
            }
            storage.write_manifest(&manifest).await?;

            log::info!(
                "{} documents ({} pages) written to {}",
                manifest.documents.len(),
                manifest.page_count(),
                storage.root().display()
            );
        }

        Command::Sweep {
            template,
            from,
            to,
            batch_size,
            json,
        } => {
            if !template.contains("{id}") {
                return Err(AppError::validation("--template must contain {id}"));
            }
            if from > to {
                return Err(AppError::validation("--from must not exceed --to"));
            }

            let links: Vec<String> = (from..=to)
                .map(|id| template.replace("{id}", &id.to_string()))
                .collect();
            let items = session.sweep(&links, batch_size).await?;

            for item in &items {
                log::info!(
                    "{} -> {}",
                    item.title,
                    item.video_url.as_deref().unwrap_or(&item.full_link)
                );
            }
            log::info!("{} video lessons in {} links", items.len(), links.len());

            if let Some(path) = json {
                write_json(&path, &items).await?;
            }
        }

        Command::Validate => {}
    }

    if session.status().stage == Stage::Complete {
        log::info!("Done!");
    }
    Ok(())
}
