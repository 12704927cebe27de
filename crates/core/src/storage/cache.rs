use crate::analysis::normalize::coerce_str;
use crate::domain::security::{Metric, SecurityMetrics};
use crate::storage::{ensure_dir, list_stamped, stamped_file_name};
use anyhow::Context;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const FUNDAMENTALS_KIND: &str = "fundamental_data";
const CSV_EXT: &str = "csv";
const DIVIDEND_SEPARATOR: &str = ";";

/// One cached CSV row. Cells stay strings so a stale or hand-edited file
/// goes back through the same tolerant coercion as provider data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct FundamentalsRow {
    ticker: String,
    name: String,
    sector: String,
    price: String,
    roe: String,
    pe_ratio: String,
    revenue_growth: String,
    earnings_growth: String,
    beta: String,
    cash_flow_to_debt: String,
    dividend_yield: String,
    dividend_per_share: String,
    change_1m: String,
    change_6m: String,
    volatility: String,
    change_1y: String,
    profit_margin: String,
    debt_to_equity: String,
    market_cap: String,
    recent_dividends: String,
}

impl FundamentalsRow {
    fn from_security(s: &SecurityMetrics) -> Self {
        let f = &s.fundamentals;
        Self {
            ticker: s.ticker.clone(),
            name: s.name.clone(),
            sector: s.sector.clone(),
            price: cell(s.price),
            roe: cell(f.roe),
            pe_ratio: cell(f.pe_ratio),
            revenue_growth: cell(f.revenue_growth),
            earnings_growth: cell(f.earnings_growth),
            beta: cell(f.beta),
            cash_flow_to_debt: cell(f.cash_flow_to_debt),
            dividend_yield: cell(f.dividend_yield),
            dividend_per_share: cell(f.dividend_per_share),
            change_1m: cell(f.change_1m),
            change_6m: cell(f.change_6m),
            volatility: cell(f.volatility),
            change_1y: cell(s.change_1y),
            profit_margin: cell(s.profit_margin),
            debt_to_equity: cell(s.debt_to_equity),
            market_cap: cell(s.market_cap),
            recent_dividends: s
                .recent_dividends
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(DIVIDEND_SEPARATOR),
        }
    }

    fn metric_cell(&self, metric: Metric) -> &str {
        match metric {
            Metric::Roe => &self.roe,
            Metric::PeRatio => &self.pe_ratio,
            Metric::RevenueGrowth => &self.revenue_growth,
            Metric::EarningsGrowth => &self.earnings_growth,
            Metric::Beta => &self.beta,
            Metric::CashFlowToDebt => &self.cash_flow_to_debt,
            Metric::DividendYield => &self.dividend_yield,
            Metric::DividendPerShare => &self.dividend_per_share,
            Metric::Change1M => &self.change_1m,
            Metric::Change6M => &self.change_6m,
            Metric::Volatility => &self.volatility,
        }
    }

    fn into_security(self) -> Option<SecurityMetrics> {
        let ticker = self.ticker.trim();
        if ticker.is_empty() {
            return None;
        }
        let mut s = SecurityMetrics::new(ticker, self.name.trim(), self.sector.trim());
        for metric in Metric::ALL {
            s.fundamentals.set(metric, coerce_str(self.metric_cell(metric)));
        }
        s.price = coerce_str(&self.price);
        s.change_1y = coerce_str(&self.change_1y);
        s.profit_margin = coerce_str(&self.profit_margin);
        s.debt_to_equity = coerce_str(&self.debt_to_equity);
        s.market_cap = coerce_str(&self.market_cap);
        s.recent_dividends = self
            .recent_dividends
            .split(DIVIDEND_SEPARATOR)
            .filter_map(coerce_str)
            .collect();
        Some(s)
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub fn save_fundamentals(
    dir: &Path,
    batch: &[SecurityMetrics],
    at: NaiveDateTime,
) -> anyhow::Result<PathBuf> {
    ensure_dir(dir)?;
    let path = dir.join(stamped_file_name(FUNDAMENTALS_KIND, CSV_EXT, at));
    let mut wtr = csv::Writer::from_path(&path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for s in batch {
        wtr.serialize(FundamentalsRow::from_security(s))
            .with_context(|| format!("failed to write row for {}", s.ticker))?;
    }
    wtr.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;

    tracing::info!(path = %path.display(), rows = batch.len(), "saved fundamentals cache");
    Ok(path)
}

pub fn read_fundamentals(path: &Path) -> anyhow::Result<Vec<SecurityMetrics>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut out = Vec::new();
    for (line, row) in rdr.deserialize::<FundamentalsRow>().enumerate() {
        let row = row.with_context(|| format!("bad row {} in {}", line + 2, path.display()))?;
        if let Some(s) = row.into_security() {
            out.push(s);
        }
    }
    Ok(out)
}

/// Most recent fundamentals cached on `date`, if any readable one exists.
///
/// An unreadable or empty cache is logged and treated as a miss.
pub fn load_today(dir: &Path, date: NaiveDate) -> Option<Vec<SecurityMetrics>> {
    let files = match list_stamped(dir, FUNDAMENTALS_KIND, CSV_EXT) {
        Ok(files) => files,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "cannot list fundamentals cache");
            return None;
        }
    };
    let (_, path) = files.into_iter().find(|(at, _)| at.date() == date)?;

    match read_fundamentals(&path) {
        Ok(batch) if !batch.is_empty() => {
            tracing::info!(path = %path.display(), rows = batch.len(), "reusing cached fundamentals");
            Some(batch)
        }
        Ok(_) => {
            tracing::warn!(path = %path.display(), "cached fundamentals file is empty; ignoring");
            None
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %format!("{err:#}"), "unreadable fundamentals cache; ignoring");
            None
        }
    }
}

/// Deletes fundamentals caches stamped more than `keep_days` before `today`.
///
/// Returns how many files were removed. Failures are logged, never fatal.
pub fn cleanup_old_files(dir: &Path, today: NaiveDate, keep_days: i64) -> usize {
    let files = match list_stamped(dir, FUNDAMENTALS_KIND, CSV_EXT) {
        Ok(files) => files,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "cannot list fundamentals cache for cleanup");
            return 0;
        }
    };
    let cutoff = today - chrono::Duration::days(keep_days.max(0));

    let mut removed = 0;
    for (at, path) in files {
        if at.date() >= cutoff {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                removed += 1;
                tracing::debug!(path = %path.display(), "removed old fundamentals cache");
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to remove old cache file");
            }
        }
    }
    if removed > 0 {
        tracing::info!(removed, keep_days, "fundamentals cache cleanup");
    }
    removed
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInfo {
    pub files: usize,
    pub latest: Option<NaiveDateTime>,
    pub latest_path: Option<PathBuf>,
    /// A cache stamped on the queried date exists.
    pub fresh: bool,
}

pub fn cache_info(dir: &Path, date: NaiveDate) -> anyhow::Result<CacheInfo> {
    let files = list_stamped(dir, FUNDAMENTALS_KIND, CSV_EXT)?;
    let latest = files.first().cloned();
    Ok(CacheInfo {
        files: files.len(),
        fresh: files.iter().any(|(at, _)| at.date() == date),
        latest: latest.as_ref().map(|(at, _)| *at),
        latest_path: latest.map(|(_, path)| path),
    })
}
