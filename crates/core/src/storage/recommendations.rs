use crate::analysis::AnalysisRun;
use crate::domain::recommendation::RunSnapshot;
use crate::storage::{ensure_dir, list_stamped, stamped_file_name};
use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const WEIGHTS_KIND: &str = "portfolio_weights";
pub const RECOMMENDATIONS_KIND: &str = "investment_recommendations";
pub const SNAPSHOT_KIND: &str = "recommendation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRun {
    pub weights: PathBuf,
    pub recommendations: PathBuf,
    pub snapshot: PathBuf,
}

/// Writes the scored batch, the allocation table and the JSON snapshot for one run.
pub fn persist_run(dir: &Path, run: &AnalysisRun, at: NaiveDateTime) -> anyhow::Result<PersistedRun> {
    ensure_dir(dir)?;

    let weights = dir.join(stamped_file_name(WEIGHTS_KIND, "csv", at));
    write_csv(&weights, &run.scored)?;

    let recommendations = dir.join(stamped_file_name(RECOMMENDATIONS_KIND, "csv", at));
    write_csv(&recommendations, &run.recommendation.items)?;

    let snapshot = dir.join(stamped_file_name(SNAPSHOT_KIND, "json", at));
    let body = serde_json::to_vec_pretty(&run.snapshot()).context("serialize run snapshot failed")?;
    std::fs::write(&snapshot, body)
        .with_context(|| format!("failed to write {}", snapshot.display()))?;

    tracing::info!(
        run_id = %run.recommendation.run_id,
        as_of_date = %run.recommendation.as_of_date,
        snapshot = %snapshot.display(),
        "persisted recommendation run"
    );

    Ok(PersistedRun {
        weights,
        recommendations,
        snapshot,
    })
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        wtr.serialize(row)
            .with_context(|| format!("failed to write row to {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("failed to flush {}", path.display()))
}

pub fn read_snapshot(path: &Path) -> anyhow::Result<RunSnapshot> {
    let body =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_slice(&body)
        .with_context(|| format!("failed to decode snapshot {}", path.display()))
}

/// Newest readable snapshot. Unreadable files are skipped with a warning.
pub fn load_latest_snapshot(dir: &Path) -> anyhow::Result<Option<RunSnapshot>> {
    find_snapshot(dir, |_| true)
}

/// Newest readable snapshot whose recommendation is for `as_of_date`.
pub fn load_snapshot_by_date(dir: &Path, as_of_date: NaiveDate) -> anyhow::Result<Option<RunSnapshot>> {
    find_snapshot(dir, |s| s.recommendation.as_of_date == as_of_date)
}

fn find_snapshot(
    dir: &Path,
    wanted: impl Fn(&RunSnapshot) -> bool,
) -> anyhow::Result<Option<RunSnapshot>> {
    for (_, path) in list_stamped(dir, SNAPSHOT_KIND, "json")? {
        match read_snapshot(&path) {
            Ok(snapshot) if wanted(&snapshot) => return Ok(Some(snapshot)),
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %format!("{err:#}"), "skipping unreadable snapshot");
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::run_analysis;
    use crate::config::AnalysisConfig;
    use crate::domain::security::SecurityMetrics;
    use chrono::{TimeZone, Utc};

    fn batch() -> Vec<SecurityMetrics> {
        ["BCI.SN", "CCU.SN", "CHILE.SN", "ENELAM.SN", "FALABELLA.SN", "SQM-B.SN"]
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut s = SecurityMetrics::new(*t, *t, if i % 2 == 0 { "Banca" } else { "Retail" });
                s.price = Some(1_000.0 + i as f64);
                s.fundamentals.roe = Some(0.05 * (i + 1) as f64);
                s.fundamentals.dividend_yield = Some(0.01 * (i + 1) as f64);
                s
            })
            .collect()
    }

    async fn run_for(day: u32) -> AnalysisRun {
        let config = AnalysisConfig {
            budget: 200_000,
            ..AnalysisConfig::default()
        };
        let as_of = NaiveDate::from_ymd_opt(2026, 3, day).unwrap();
        let generated = Utc.with_ymd_and_hms(2026, 3, day, 21, 0, 0).unwrap();
        run_analysis(&batch(), &config, None, as_of, generated).await.unwrap()
    }

    fn stamp(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn persisted_run_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_for(2).await;
        let files = persist_run(dir.path(), &run, stamp(2, 17)).unwrap();

        assert!(files.weights.ends_with("portfolio_weights_20260302_170000.csv"));
        let weights = std::fs::read_to_string(&files.weights).unwrap();
        assert!(weights.starts_with("ticker,name,sector,score,weight_assigned"));
        assert_eq!(weights.lines().count(), run.scored.len() + 1);

        let table = std::fs::read_to_string(&files.recommendations).unwrap();
        assert!(table.lines().next().unwrap().ends_with("percentage,amount"));

        let latest = load_latest_snapshot(dir.path()).unwrap().unwrap();
        assert_eq!(latest.recommendation.run_id, run.recommendation.run_id);
        assert_eq!(latest.recommendation.total_invested, 200_000);
    }

    #[tokio::test]
    async fn looks_up_by_as_of_date_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let first = run_for(2).await;
        let second = run_for(3).await;
        persist_run(dir.path(), &first, stamp(2, 17)).unwrap();
        persist_run(dir.path(), &second, stamp(3, 17)).unwrap();
        std::fs::write(
            dir.path().join(stamped_file_name(SNAPSHOT_KIND, "json", stamp(4, 9))),
            "not json",
        )
        .unwrap();

        let latest = load_latest_snapshot(dir.path()).unwrap().unwrap();
        assert_eq!(latest.recommendation.run_id, second.recommendation.run_id);

        let day2 = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let found = load_snapshot_by_date(dir.path(), day2).unwrap().unwrap();
        assert_eq!(found.recommendation.run_id, first.recommendation.run_id);

        let day9 = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        assert!(load_snapshot_by_date(dir.path(), day9).unwrap().is_none());
    }

    #[test]
    fn empty_dir_has_no_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_latest_snapshot(dir.path()).unwrap().is_none());
    }
}
