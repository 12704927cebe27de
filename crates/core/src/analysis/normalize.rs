use crate::domain::security::{Metric, SecurityMetrics};
use serde_json::Value;
use std::collections::HashSet;

/// Coerces a provider value into a finite number.
///
/// Accepts numbers, numeric strings (thousands separators and a trailing `%` allowed)
/// and Yahoo-style `{"raw": x}` wrappers. Everything else is missing.
pub fn coerce_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().and_then(finite),
        Value::String(s) => coerce_str(s),
        Value::Object(map) => map.get("raw").and_then(coerce_value),
        _ => None,
    }
}

pub fn coerce_str(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if matches!(
        s.to_ascii_lowercase().as_str(),
        "n/a" | "na" | "nan" | "none" | "null" | "-"
    ) {
        return None;
    }
    let (body, percent) = match s.strip_suffix('%') {
        Some(body) => (body.trim(), true),
        None => (s, false),
    };
    let cleaned: String = body.chars().filter(|c| *c != ',').collect();
    let n = cleaned.parse::<f64>().ok().and_then(finite)?;
    Some(if percent { n / 100.0 } else { n })
}

fn finite(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

/// Keeps the first occurrence of each ticker.
pub fn dedup_tickers(batch: &[SecurityMetrics]) -> Vec<SecurityMetrics> {
    let mut seen = HashSet::new();
    batch
        .iter()
        .filter(|s| seen.insert(s.ticker.clone()))
        .cloned()
        .collect()
}

/// Fills a missing dividend yield from the latest dividend over the current price.
pub fn backfill_dividend_yield(security: &mut SecurityMetrics) {
    if security.fundamentals.dividend_yield.and_then(finite).is_some() {
        return;
    }
    let (Some(last), Some(price)) = (security.recent_dividends.last(), security.price) else {
        return;
    };
    if price.is_finite() && price > 0.0 && last.is_finite() {
        security.fundamentals.dividend_yield = Some(last / price);
    }
}

/// Dedups, applies the dividend filter and backfills yields.
///
/// With `dividend_preference` only dividend payers are kept, unless none pay, in which
/// case the whole batch is used.
pub fn prepare(batch: &[SecurityMetrics], dividend_preference: bool) -> Vec<SecurityMetrics> {
    let mut prepared = dedup_tickers(batch);
    if dividend_preference {
        let payers: Vec<SecurityMetrics> = prepared
            .iter()
            .filter(|s| s.pays_dividends())
            .cloned()
            .collect();
        if payers.is_empty() {
            tracing::warn!(
                securities = prepared.len(),
                "no dividend payers in batch; scoring all securities"
            );
        } else {
            prepared = payers;
        }
    }
    for security in &mut prepared {
        backfill_dividend_yield(security);
    }
    prepared
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSecurity {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    values: [f64; 11],
}

impl NormalizedSecurity {
    pub fn value(&self, metric: Metric) -> f64 {
        self.values[metric.index()]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedBatch {
    pub securities: Vec<NormalizedSecurity>,
    /// Metrics with at least one real value before missing entries were zero-filled.
    pub present: Vec<Metric>,
}

impl NormalizedBatch {
    pub fn column(&self, metric: Metric) -> Vec<f64> {
        self.securities.iter().map(|s| s.value(metric)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.securities.is_empty()
    }
}

pub fn normalize(batch: &[SecurityMetrics]) -> NormalizedBatch {
    let present = Metric::ALL
        .iter()
        .copied()
        .filter(|m| {
            batch
                .iter()
                .any(|s| s.fundamentals.get(*m).and_then(finite).is_some())
        })
        .collect();

    let securities = batch
        .iter()
        .map(|s| {
            let mut values = [0.0; 11];
            for metric in Metric::ALL {
                values[metric.index()] =
                    s.fundamentals.get(metric).and_then(finite).unwrap_or(0.0);
            }
            NormalizedSecurity {
                ticker: s.ticker.clone(),
                name: s.name.clone(),
                sector: s.sector.clone(),
                values,
            }
        })
        .collect();

    NormalizedBatch {
        securities,
        present,
    }
}
