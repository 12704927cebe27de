use crate::domain::market::{Highlight, MarketSummary, SectorCount};
use crate::domain::security::SecurityMetrics;
use std::collections::BTreeMap;

const HIGHLIGHTS: usize = 5;

pub fn market_summary(batch: &[SecurityMetrics]) -> MarketSummary {
    let mut sectors: BTreeMap<&str, usize> = BTreeMap::new();
    for s in batch {
        *sectors.entry(s.sector.as_str()).or_default() += 1;
    }
    let mut sectors: Vec<SectorCount> = sectors
        .into_iter()
        .map(|(sector, count)| SectorCount {
            sector: sector.to_string(),
            count,
        })
        .collect();
    sectors.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.sector.cmp(&b.sector)));

    MarketSummary {
        total_securities: batch.len(),
        dividend_payers: batch.iter().filter(|s| s.pays_dividends()).count(),
        average_price: average(batch.iter().map(|s| s.price)),
        average_dividend_yield: average(batch.iter().map(|s| s.fundamentals.dividend_yield)),
        average_change_6m: average(batch.iter().map(|s| s.fundamentals.change_6m)),
        sectors,
        top_performers: highlights(batch, |s| s.fundamentals.change_6m),
        top_dividend_payers: highlights(batch, |s| s.fundamentals.dividend_yield),
    }
}

fn average(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values
        .flatten()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

fn highlights(
    batch: &[SecurityMetrics],
    value: impl Fn(&SecurityMetrics) -> Option<f64>,
) -> Vec<Highlight> {
    let mut ranked: Vec<Highlight> = batch
        .iter()
        .filter_map(|s| {
            value(s).filter(|v| v.is_finite()).map(|v| Highlight {
                ticker: s.ticker.clone(),
                name: s.name.clone(),
                value: v,
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.value.total_cmp(&a.value).then_with(|| a.ticker.cmp(&b.ticker)));
    ranked.truncate(HIGHLIGHTS);
    ranked
}
