use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mojifix_core::confirm::{ConfirmationGate, DEFAULT_PURGE_SEQUENCE};
use mojifix_core::fixer::TextFixer;
use mojifix_core::replacement_map::ReplacementMap;
use mojifix_core::scan::CandidateFilter;
use mojifix_core::target::RepairTarget;
use mojifix_db::repositories::CandidateQuery;
use mojifix_pipeline::diagnostics;
use mojifix_pipeline::export::{export_candidates, ExportOptions};
use mojifix_pipeline::postgres::{Connections, PgCandidateSource};
use mojifix_pipeline::preview::{preview_post, preview_row};
use mojifix_pipeline::purge::purge_map;
use mojifix_pipeline::run::{execute, Confirmer, RunOutcome, RunPlan, PgRunBackend};
use mojifix_pipeline::stats::UserStatsRebuilder;
use mojifix_pipeline::RepairEngine;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mojifix_cli::config::RepairConfig;
use mojifix_cli::prompt::StdinConfirmer;

/// Exit status after Ctrl-C.
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Debug, Parser)]
#[command(name = "mojifix")]
#[command(about = "Repair mis-decoded UTF-8 in the forum archive")]
struct Cli {
    /// Overrides DATABASE_URL.
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// JSON replacement map; overrides REPAIR_MAP_PATH.
    #[arg(long, global = true)]
    map: Option<PathBuf>,

    /// Rows per chunk; overrides REPAIR_BATCH_SIZE.
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the server version and table sizes.
    Check,
    /// Apply schema migrations to an empty database.
    Migrate,
    /// Repair comments.content, posts.title and comments.author in turn.
    Run {
        /// Leave comments.author (and user_stats) alone.
        #[arg(long, default_value_t = false)]
        skip_author: bool,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Repair one column.
    Repair {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Show one row before and after repair. Never writes.
    Preview {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        id: i64,
    },
    /// Show a post title and all of its comments before and after repair.
    PreviewPost { post_id: i32 },
    /// Write candidate rows with their repaired values as JSON lines.
    Export {
        #[command(flatten)]
        target: TargetArgs,
        #[arg(long)]
        out: PathBuf,
        /// Only rows the repair would change.
        #[arg(long, default_value_t = false)]
        changed_only: bool,
    },
    /// Delete every occurrence of a literal sequence.
    Purge {
        #[arg(long, default_value = DEFAULT_PURGE_SEQUENCE)]
        sequence: String,
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        limits: LimitArgs,
    },
    /// Recompute user_stats from comments.
    RebuildStats,
    /// Write IDs of posts that have no comments.
    Orphans {
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Debug, Args)]
struct TargetArgs {
    #[arg(long, default_value = "comments")]
    table: String,
    #[arg(long, default_value = "content")]
    column: String,
    #[arg(long, default_value = "id")]
    pk_column: String,
}

impl TargetArgs {
    fn target(&self) -> Result<RepairTarget> {
        Ok(RepairTarget::new(&self.table, &self.column, &self.pk_column)?)
    }
}

#[derive(Debug, Args)]
struct LimitArgs {
    /// Stop each pass after this many chunks.
    #[arg(long)]
    max_batches: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mojifix=info,mojifix_pipeline=info,mojifix_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received; stopping after the current chunk");
                cancel.cancel();
            }
        }
    });

    let result = dispatch(cli, cancel.clone()).await;

    if cancel.is_cancelled() {
        if let Err(e) = &result {
            tracing::error!(error = %format!("{e:#}"), "Interrupted");
        }
        // A pending prompt read would otherwise keep the runtime alive.
        std::process::exit(i32::from(EXIT_INTERRUPTED));
    }

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "mojifix failed");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<ExitCode> {
    let config = RepairConfig::from_env()?
        .with_overrides(cli.database_url, cli.batch_size, cli.map)?;
    let database_url = config.database_url()?.to_string();

    match cli.command {
        Command::Check => check(&database_url).await,
        Command::Migrate => migrate(&database_url).await,
        Command::Run { skip_author, limits } => {
            let map = config.load_map()?;
            let plan = RunPlan::full(!skip_author);
            run_plan(&database_url, &config, &map, &plan, &limits, cancel).await
        }
        Command::Repair { target, limits } => {
            let map = config.load_map()?;
            let plan = RunPlan::single(target.target()?);
            run_plan(&database_url, &config, &map, &plan, &limits, cancel).await
        }
        Command::Purge {
            sequence,
            target,
            limits,
        } => {
            let map = purge_map(&sequence)?;
            let plan = RunPlan::purge(target.target()?, sequence);
            run_plan(&database_url, &config, &map, &plan, &limits, cancel).await
        }
        Command::Preview { target, id } => {
            let map = config.load_map()?;
            let pool = connect_pool(&database_url).await?;
            let target = target.target()?;
            match preview_row(&pool, &TextFixer::new(&map), &target, id).await? {
                Some(preview) => {
                    preview.render(&mut io::stdout().lock())?;
                    Ok(ExitCode::SUCCESS)
                }
                None => bail!("{} has no row with {} = {id}", target.table(), target.pk_column()),
            }
        }
        Command::PreviewPost { post_id } => {
            let map = config.load_map()?;
            let pool = connect_pool(&database_url).await?;
            match preview_post(&pool, &TextFixer::new(&map), post_id).await? {
                Some(preview) => {
                    preview.render(&mut io::stdout().lock())?;
                    Ok(ExitCode::SUCCESS)
                }
                None => bail!("No post with id {post_id}"),
            }
        }
        Command::Export {
            target,
            out,
            changed_only,
        } => {
            let map = config.load_map()?;
            export(&database_url, &map, &target.target()?, &out, config.batch_size, changed_only).await
        }
        Command::RebuildStats => rebuild_stats(&database_url, cancel).await,
        Command::Orphans { out } => {
            let pool = connect_pool(&database_url).await?;
            let file = File::create(&out)
                .with_context(|| format!("Cannot create {}", out.display()))?;
            let count = diagnostics::write_orphan_post_ids(&pool, &mut BufWriter::new(file)).await?;
            println!("{count} post(s) without comments written to {}", out.display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn connect_pool(database_url: &str) -> Result<mojifix_db::DbPool> {
    mojifix_db::create_pool(database_url)
        .await
        .context("Failed to connect to database")
}

async fn check(database_url: &str) -> Result<ExitCode> {
    let pool = connect_pool(database_url).await?;
    let report = diagnostics::check(&pool).await?;
    println!("{}", report.server_version);
    println!("posts:      {}", report.posts);
    println!("comments:   {}", report.comments);
    println!("user_stats: {}", report.user_stats);
    Ok(ExitCode::SUCCESS)
}

async fn migrate(database_url: &str) -> Result<ExitCode> {
    let pool = connect_pool(database_url).await?;
    mojifix_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");
    Ok(ExitCode::SUCCESS)
}

async fn run_plan(
    database_url: &str,
    config: &RepairConfig,
    map: &ReplacementMap,
    plan: &RunPlan,
    limits: &LimitArgs,
    cancel: CancellationToken,
) -> Result<ExitCode> {
    let engine = RepairEngine::new(map)
        .with_batch_size(config.batch_size)?
        .with_max_batches(limits.max_batches)
        .with_cancel(cancel.clone());

    let conns = Connections::open(database_url).await?;
    let mut backend = PgRunBackend::new(conns, &engine);
    let mut confirmer = StdinConfirmer::new(cancel.clone());

    let outcome = execute(plan, &mut backend, &mut confirmer, &cancel).await?;
    print_outcome(&outcome);

    Ok(if outcome.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_outcome(outcome: &RunOutcome) {
    if outcome.aborted {
        println!("Aborted: backup not confirmed. Nothing was changed.");
        return;
    }
    for report in &outcome.reports {
        println!("{}", report.summary());
        for failure in &report.failures {
            println!(
                "  chunk {} (keys {}..={}, {} rows): {}",
                failure.chunk, failure.first_pk, failure.last_pk, failure.rows, failure.message
            );
        }
    }
    for failure in &outcome.failed {
        println!("{}: failed: {}", failure.target.qualified(), failure.message);
    }
    for target in &outcome.skipped {
        println!("{}: skipped", target.qualified());
    }
    if let Some(stats) = &outcome.stats {
        println!("user_stats rebuilt: {} author(s)", stats.authors);
    }
    if outcome.cancelled {
        println!("Interrupted. Rerun the same command to continue.");
    }
}

async fn export(
    database_url: &str,
    map: &ReplacementMap,
    target: &RepairTarget,
    out: &Path,
    batch_size: usize,
    changed_only: bool,
) -> Result<ExitCode> {
    let mut read = mojifix_db::connect(database_url)
        .await
        .context("Failed to connect to database")?;
    let query = CandidateQuery::new(target, &CandidateFilter::from_map(map));
    let mut source = PgCandidateSource::new(&query, &mut read);

    let file = File::create(out).with_context(|| format!("Cannot create {}", out.display()))?;
    let mut writer = BufWriter::new(file);
    let summary = export_candidates(
        &TextFixer::new(map),
        target,
        &mut source,
        &mut writer,
        ExportOptions {
            batch_size,
            changed_only,
        },
    )
    .await?;
    writer.flush()?;

    println!(
        "{}: scanned {}, would change {}, wrote {} line(s) to {} (run {})",
        summary.target,
        summary.scanned,
        summary.changed,
        summary.written,
        out.display(),
        summary.run_id
    );
    Ok(ExitCode::SUCCESS)
}

async fn rebuild_stats(database_url: &str, cancel: CancellationToken) -> Result<ExitCode> {
    let gate = ConfirmationGate::rebuild_stats();
    let answer = StdinConfirmer::new(cancel).confirm(&gate).await;
    if !gate.accepts(answer.as_deref()) {
        println!("Not confirmed. user_stats left as it is.");
        return Ok(ExitCode::FAILURE);
    }

    let pool = connect_pool(database_url).await?;
    let stats = UserStatsRebuilder::new(pool).rebuild().await?;
    println!("user_stats rebuilt: {} author(s)", stats.authors);
    Ok(ExitCode::SUCCESS)
}
