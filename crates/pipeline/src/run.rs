//! Operator-driven runs: a plan of passes, each counted, confirmed, then
//! repaired, with a `user_stats` rebuild after any author pass.
//!
//! Every mutating step waits behind a [`ConfirmationGate`]. A declined pass
//! gate skips that pass; a declined backup gate ends the run before anything
//! is touched.

use std::future::Future;

use mojifix_core::confirm::ConfirmationGate;
use mojifix_core::run_phase::{RunPhase, RunProgress};
use mojifix_core::scan::CandidateFilter;
use mojifix_core::target::{full_run_passes, RepairTarget};
use tokio_util::sync::CancellationToken;

use crate::engine::{RepairEngine, RepairReport};
use crate::error::RepairError;
use crate::postgres::{count_candidates, repair_pass, Connections};
use crate::stats::{StatsReport, UserStatsRebuilder};

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Asks the operator to type a gate's phrase.
pub trait Confirmer: Send {
    /// The typed line, or `None` if input ended or was interrupted.
    fn confirm(&mut self, gate: &ConfirmationGate) -> impl Future<Output = Option<String>> + Send;
}

/// What a run does at each phase.
pub trait RunBackend: Send {
    fn count(
        &mut self,
        target: &RepairTarget,
    ) -> impl Future<Output = Result<i64, RepairError>> + Send;

    fn repair(
        &mut self,
        target: &RepairTarget,
    ) -> impl Future<Output = Result<RepairReport, RepairError>> + Send;

    fn rebuild_stats(&mut self) -> impl Future<Output = Result<StatsReport, RepairError>> + Send;
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Gate shown before each pass of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassGate {
    Confirm,
    Purge(String),
}

#[derive(Debug, Clone)]
pub struct RunPlan {
    pub backup_gate: bool,
    pub passes: Vec<RepairTarget>,
    pub gate: PassGate,
}

impl RunPlan {
    /// `comments.content`, `posts.title`, and optionally `comments.author`,
    /// behind the backup gate.
    pub fn full(include_author: bool) -> Self {
        Self {
            backup_gate: true,
            passes: full_run_passes(include_author),
            gate: PassGate::Confirm,
        }
    }

    pub fn single(target: RepairTarget) -> Self {
        Self {
            backup_gate: false,
            passes: vec![target],
            gate: PassGate::Confirm,
        }
    }

    pub fn purge(target: RepairTarget, sequence: impl Into<String>) -> Self {
        Self {
            backup_gate: false,
            passes: vec![target],
            gate: PassGate::Purge(sequence.into()),
        }
    }

    fn gate_for(&self, target: &RepairTarget, candidates: i64) -> ConfirmationGate {
        match &self.gate {
            PassGate::Confirm => ConfirmationGate::pass(target, candidates),
            PassGate::Purge(sequence) => ConfirmationGate::purge(sequence, target),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// A pass whose candidate scan broke. The run moved on to the next pass.
#[derive(Debug, Clone)]
pub struct PassFailure {
    pub target: RepairTarget,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RunOutcome {
    pub reports: Vec<RepairReport>,
    pub skipped: Vec<RepairTarget>,
    pub failed: Vec<PassFailure>,
    pub stats: Option<StatsReport>,
    /// The backup gate was declined.
    pub aborted: bool,
    pub cancelled: bool,
    pub phases: Vec<RunPhase>,
}

impl RunOutcome {
    /// No pass lost rows to a failed chunk.
    pub fn all_writes_succeeded(&self) -> bool {
        self.reports.iter().all(|r| r.failures.is_empty())
    }

    /// Every confirmed pass ran to the end of its scan and wrote every chunk.
    pub fn succeeded(&self) -> bool {
        !self.aborted && self.failed.is_empty() && self.all_writes_succeeded()
    }

    fn record_failure(&mut self, target: &RepairTarget, err: RepairError) {
        tracing::error!(pass = %target.qualified(), error = %err, "Pass failed; moving on");
        self.failed.push(PassFailure {
            target: target.clone(),
            message: err.to_string(),
        });
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Walk `plan` through the run phases.
pub async fn execute<B, C>(
    plan: &RunPlan,
    backend: &mut B,
    confirmer: &mut C,
    cancel: &CancellationToken,
) -> Result<RunOutcome, RepairError>
where
    B: RunBackend,
    C: Confirmer,
{
    let mut progress = RunProgress::new();
    let mut outcome = RunOutcome::default();

    if plan.backup_gate {
        let gate = ConfirmationGate::backup();
        let answer = confirmer.confirm(&gate).await;
        if !gate.accepts(answer.as_deref()) {
            tracing::warn!("Backup not confirmed; nothing was changed");
            outcome.aborted = true;
            progress.advance(RunPhase::Done)?;
            outcome.phases = progress.history().to_vec();
            return Ok(outcome);
        }
    }

    for target in &plan.passes {
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }

        progress.advance(RunPhase::Scanning(target.clone()))?;
        let candidates = match backend.count(target).await {
            Ok(n) => n,
            Err(err) if err.is_pass_local() => {
                outcome.record_failure(target, err);
                continue;
            }
            Err(err) => return Err(err),
        };
        tracing::info!(pass = %target.qualified(), candidates, "Scan complete");

        let gate = plan.gate_for(target, candidates);
        let answer = confirmer.confirm(&gate).await;
        if !gate.accepts(answer.as_deref()) {
            tracing::warn!(pass = %target.qualified(), "Pass not confirmed; skipping");
            outcome.skipped.push(target.clone());
            continue;
        }

        progress.advance(RunPhase::Repairing(target.clone()))?;
        match backend.repair(target).await {
            Ok(report) => {
                tracing::info!("{}", report.summary());
                outcome.cancelled |= report.cancelled;
                outcome.reports.push(report);
            }
            Err(err) if err.is_pass_local() => outcome.record_failure(target, err),
            Err(err) => return Err(err),
        }

        // Runs even after a cancelled, partly failed or broken author pass:
        // any author that did change already invalidated the table.
        if target.feeds_user_stats() {
            progress.advance(RunPhase::RebuildingStats)?;
            outcome.stats = Some(backend.rebuild_stats().await?);
        }
    }

    progress.advance(RunPhase::Done)?;
    outcome.phases = progress.history().to_vec();
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// PostgreSQL backend
// ---------------------------------------------------------------------------

/// Runs passes with one engine over live connections.
pub struct PgRunBackend<'e, 'm> {
    conns: Connections,
    engine: &'e RepairEngine<'m>,
    filter: CandidateFilter,
}

impl<'e, 'm> PgRunBackend<'e, 'm> {
    pub fn new(conns: Connections, engine: &'e RepairEngine<'m>) -> Self {
        let filter = CandidateFilter::from_map(engine.map());
        Self {
            conns,
            engine,
            filter,
        }
    }
}

impl RunBackend for PgRunBackend<'_, '_> {
    async fn count(&mut self, target: &RepairTarget) -> Result<i64, RepairError> {
        count_candidates(&self.conns.pool, target, &self.filter).await
    }

    async fn repair(&mut self, target: &RepairTarget) -> Result<RepairReport, RepairError> {
        repair_pass(&mut self.conns, self.engine, target, &self.filter).await
    }

    async fn rebuild_stats(&mut self) -> Result<StatsReport, RepairError> {
        UserStatsRebuilder::new(self.conns.pool.clone()).rebuild().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use mojifix_core::replacement_map::ReplacementMap;

    use super::*;
    use crate::engine::tests::FakeTable;

    struct Scripted(VecDeque<Option<&'static str>>);

    impl Confirmer for Scripted {
        async fn confirm(&mut self, _gate: &ConfirmationGate) -> Option<String> {
            self.0.pop_front().flatten().map(str::to_string)
        }
    }

    /// Backend over in-memory tables that records every call.
    struct FakeBackend {
        map: ReplacementMap,
        content: FakeTable,
        title: FakeTable,
        author: FakeTable,
        calls: Vec<String>,
        /// `table.column` whose scan breaks, at count or at repair.
        broken_count: Option<&'static str>,
        broken_scan: Option<&'static str>,
    }

    impl FakeBackend {
        fn new() -> Self {
            Self {
                map: ReplacementMap::builder().substring("Ã¶", "ö").build().unwrap(),
                content: FakeTable::with_rows(&[(1, Some("gÃ¶z"))]),
                title: FakeTable::with_rows(&[(1, Some("BaÅŸlÄ±k Ã¶"))]),
                author: FakeTable::with_rows(&[(1, Some("GÃ¶khan"))]),
                calls: Vec::new(),
                broken_count: None,
                broken_scan: None,
            }
        }

        fn scan_error(target: &RepairTarget) -> RepairError {
            RepairError::Query {
                table: target.table().to_string(),
                column: target.column().to_string(),
                source: sqlx::Error::Protocol("cursor lost".into()),
            }
        }

        fn table(&self, target: &RepairTarget) -> FakeTable {
            match target.qualified().as_str() {
                "comments.content" => self.content.clone(),
                "posts.title" => self.title.clone(),
                _ => self.author.clone(),
            }
        }
    }

    impl RunBackend for FakeBackend {
        async fn count(&mut self, target: &RepairTarget) -> Result<i64, RepairError> {
            self.calls.push(format!("count {}", target.qualified()));
            if self.broken_count == Some(target.qualified().as_str()) {
                return Err(Self::scan_error(target));
            }
            Ok(1)
        }

        async fn repair(&mut self, target: &RepairTarget) -> Result<RepairReport, RepairError> {
            self.calls.push(format!("repair {}", target.qualified()));
            if self.broken_scan == Some(target.qualified().as_str()) {
                return Err(Self::scan_error(target));
            }
            let table = self.table(target);
            RepairEngine::new(&self.map)
                .repair(target, &mut table.source(), &table)
                .await
        }

        async fn rebuild_stats(&mut self) -> Result<StatsReport, RepairError> {
            self.calls.push("rebuild_stats".to_string());
            Ok(StatsReport { authors: 1 })
        }
    }

    fn answers(list: &[Option<&'static str>]) -> Scripted {
        Scripted(list.iter().copied().collect())
    }

    #[tokio::test]
    async fn full_run_with_author_rebuilds_stats() {
        let mut backend = FakeBackend::new();
        let mut confirmer = answers(&[Some("YES"), Some("yes"), Some("yes"), Some("yes")]);

        let outcome = execute(&RunPlan::full(true), &mut backend, &mut confirmer, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            backend.calls,
            vec![
                "count comments.content",
                "repair comments.content",
                "count posts.title",
                "repair posts.title",
                "count comments.author",
                "repair comments.author",
                "rebuild_stats",
            ]
        );
        assert_eq!(outcome.reports.len(), 3);
        assert!(outcome.succeeded());
        assert!(outcome.stats.is_some());
        assert_eq!(outcome.phases.last(), Some(&RunPhase::Done));
        assert_eq!(backend.author.get(1).as_deref(), Some("Gökhan"));
    }

    #[tokio::test]
    async fn declined_backup_touches_nothing() {
        let mut backend = FakeBackend::new();
        let mut confirmer = answers(&[Some("yes")]);

        let outcome = execute(&RunPlan::full(true), &mut backend, &mut confirmer, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.aborted);
        assert!(backend.calls.is_empty());
        assert_eq!(backend.content.get(1).as_deref(), Some("gÃ¶z"));
    }

    #[tokio::test]
    async fn declined_pass_is_skipped() {
        let mut backend = FakeBackend::new();
        let mut confirmer = answers(&[Some("YES"), Some("no"), None]);

        let outcome = execute(&RunPlan::full(false), &mut backend, &mut confirmer, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.skipped.len(), 2);
        assert!(outcome.reports.is_empty());
        assert_eq!(backend.calls, vec!["count comments.content", "count posts.title"]);
        assert!(outcome.stats.is_none());
    }

    #[tokio::test]
    async fn single_author_pass_rebuilds_stats_without_backup_gate() {
        let mut backend = FakeBackend::new();
        let mut confirmer = answers(&[Some("yes")]);

        let outcome = execute(
            &RunPlan::single(RepairTarget::comment_author()),
            &mut backend,
            &mut confirmer,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(backend.calls.last().map(String::as_str), Some("rebuild_stats"));
        assert!(outcome.all_writes_succeeded());
    }

    #[tokio::test]
    async fn purge_requires_remove_phrase() {
        let mut backend = FakeBackend::new();
        let plan = RunPlan::purge(RepairTarget::comment_content(), "ï¿½");

        let mut wrong = answers(&[Some("yes")]);
        let outcome = execute(&plan, &mut backend, &mut wrong, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.skipped.len(), 1);

        let mut right = answers(&[Some("REMOVE ï¿½")]);
        let outcome = execute(&plan, &mut backend, &mut right, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.reports.len(), 1);
    }

    #[tokio::test]
    async fn broken_scan_ends_only_its_pass() {
        let mut backend = FakeBackend::new();
        backend.broken_scan = Some("comments.content");
        let mut confirmer = answers(&[Some("YES"), Some("yes"), Some("yes"), Some("yes")]);

        let outcome = execute(&RunPlan::full(true), &mut backend, &mut confirmer, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            backend.calls,
            vec![
                "count comments.content",
                "repair comments.content",
                "count posts.title",
                "repair posts.title",
                "count comments.author",
                "repair comments.author",
                "rebuild_stats",
            ]
        );
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].target, RepairTarget::comment_content());
        assert_eq!(outcome.reports.len(), 2);
        assert!(!outcome.succeeded());
        assert_eq!(backend.content.get(1).as_deref(), Some("gÃ¶z"));
        assert_eq!(backend.author.get(1).as_deref(), Some("Gökhan"));
    }

    #[tokio::test]
    async fn broken_author_scan_still_rebuilds_stats() {
        let mut backend = FakeBackend::new();
        backend.broken_scan = Some("comments.author");
        let mut confirmer = answers(&[Some("yes")]);

        let outcome = execute(
            &RunPlan::single(RepairTarget::comment_author()),
            &mut backend,
            &mut confirmer,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome.failed.len(), 1);
        assert!(outcome.stats.is_some());
        assert_eq!(backend.calls.last().map(String::as_str), Some("rebuild_stats"));
        assert_eq!(outcome.phases.last(), Some(&RunPhase::Done));
    }

    #[tokio::test]
    async fn broken_count_skips_to_next_pass() {
        let mut backend = FakeBackend::new();
        backend.broken_count = Some("comments.content");
        let mut confirmer = answers(&[Some("YES"), Some("yes")]);

        let outcome = execute(&RunPlan::full(false), &mut backend, &mut confirmer, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            backend.calls,
            vec!["count comments.content", "count posts.title", "repair posts.title"]
        );
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.reports.len(), 1);
    }

    #[tokio::test]
    async fn connection_loss_ends_the_run() {
        struct Offline;

        impl RunBackend for Offline {
            async fn count(&mut self, _target: &RepairTarget) -> Result<i64, RepairError> {
                Err(RepairError::Connection(sqlx::Error::PoolTimedOut))
            }

            async fn repair(&mut self, _target: &RepairTarget) -> Result<RepairReport, RepairError> {
                unreachable!("count fails first")
            }

            async fn rebuild_stats(&mut self) -> Result<StatsReport, RepairError> {
                unreachable!("count fails first")
            }
        }

        let mut confirmer = answers(&[Some("YES")]);
        let result = execute(&RunPlan::full(true), &mut Offline, &mut confirmer, &CancellationToken::new()).await;
        assert!(matches!(result, Err(RepairError::Connection(_))));
    }

    #[tokio::test]
    async fn cancelled_run_stops_before_next_pass() {
        let mut backend = FakeBackend::new();
        let mut confirmer = answers(&[Some("YES"), Some("yes"), Some("yes")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = execute(&RunPlan::full(false), &mut backend, &mut confirmer, &cancel)
            .await
            .unwrap();

        assert!(outcome.cancelled);
        assert!(backend.calls.is_empty());
    }
}
