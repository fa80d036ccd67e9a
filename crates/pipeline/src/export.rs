//! Dry-run export: stream candidates, fix them in memory, and write one
//! JSON line per row instead of touching storage.

use std::io::Write;

use mojifix_core::fixer::TextFixer;
use mojifix_core::target::RepairTarget;
use mojifix_core::types::RowKey;
use serde::Serialize;
use uuid::Uuid;

use crate::engine::CandidateSource;
use crate::error::RepairError;

/// One exported line.
#[derive(Debug, Serialize)]
pub struct ExportRecord<'a> {
    pub run_id: Uuid,
    pub pk: RowKey,
    pub changed: bool,
    pub original: Option<&'a str>,
    pub fixed: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportSummary {
    pub run_id: Uuid,
    pub target: String,
    pub scanned: u64,
    pub changed: u64,
    pub written: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    pub batch_size: usize,
    /// Skip rows the fixer leaves as they are.
    pub changed_only: bool,
}

/// Drain `source` into `out` as JSON lines.
pub async fn export_candidates<S, W>(
    fixer: &TextFixer<'_>,
    target: &RepairTarget,
    source: &mut S,
    out: &mut W,
    options: ExportOptions,
) -> Result<ExportSummary, RepairError>
where
    S: CandidateSource,
    W: Write,
{
    let mut summary = ExportSummary {
        run_id: Uuid::now_v7(),
        target: target.qualified(),
        scanned: 0,
        changed: 0,
        written: 0,
    };
    tracing::info!(run_id = %summary.run_id, table = %summary.target, "Export started");

    loop {
        let rows = source
            .next_chunk(options.batch_size)
            .await
            .map_err(|source| RepairError::Query {
                table: target.table().to_string(),
                column: target.column().to_string(),
                source,
            })?;
        if rows.is_empty() {
            break;
        }

        for row in &rows {
            summary.scanned += 1;
            let fixed = fixer.fix(row.text.as_deref());
            let changed = fixed.as_deref() != row.text.as_deref();
            if changed {
                summary.changed += 1;
            } else if options.changed_only {
                continue;
            }
            let record = ExportRecord {
                run_id: summary.run_id,
                pk: row.pk,
                changed,
                original: row.text.as_deref(),
                fixed: fixed.as_deref(),
            };
            serde_json::to_writer(&mut *out, &record)?;
            out.write_all(b"\n")?;
            summary.written += 1;
        }
    }

    out.flush()?;
    tracing::info!(
        scanned = summary.scanned,
        changed = summary.changed,
        written = summary.written,
        "Export finished"
    );
    Ok(summary)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use mojifix_core::replacement_map::ReplacementMap;

    use super::*;
    use crate::engine::tests::FakeTable;

    fn table() -> FakeTable {
        FakeTable::with_rows(&[(1, Some("gÃ¶z")), (2, Some("clean")), (3, None)])
    }

    #[tokio::test]
    async fn writes_every_candidate() {
        let map = ReplacementMap::builder().substring("Ã¶", "ö").build().unwrap();
        let fixer = TextFixer::new(&map);
        let table = table();
        let mut out = Vec::new();

        let summary = export_candidates(
            &fixer,
            &RepairTarget::comment_content(),
            &mut table.source(),
            &mut out,
            ExportOptions { batch_size: 2, changed_only: false },
        )
        .await
        .unwrap();

        assert_eq!((summary.scanned, summary.changed, summary.written), (3, 1, 3));
        let lines: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["fixed"], "göz");
        assert_eq!(lines[0]["changed"], true);
        assert_eq!(lines[2]["original"], serde_json::Value::Null);
        assert_eq!(lines[1]["run_id"], summary.run_id.to_string());
        // Storage is untouched.
        assert_eq!(table.get(1).as_deref(), Some("gÃ¶z"));
    }

    #[tokio::test]
    async fn changed_only_skips_clean_rows() {
        let map = ReplacementMap::builder().substring("Ã¶", "ö").build().unwrap();
        let fixer = TextFixer::new(&map);
        let table = table();
        let mut out = Vec::new();

        let summary = export_candidates(
            &fixer,
            &RepairTarget::comment_content(),
            &mut table.source(),
            &mut out,
            ExportOptions { batch_size: 10, changed_only: true },
        )
        .await
        .unwrap();

        assert_eq!(summary.written, 1);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 1);
    }
}
