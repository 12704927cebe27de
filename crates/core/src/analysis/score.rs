use crate::analysis::normalize::NormalizedBatch;
use crate::analysis::weights::WeightVector;
use crate::domain::recommendation::{ScoreRecord, ScoringFallback, ScoringMode};

#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub records: Vec<ScoreRecord>,
    pub mode: ScoringMode,
    /// Effective weights after restriction to present metrics; `None` under equal weighting.
    pub weights: Option<WeightVector>,
}

/// Rescales to [0, 1]. A constant column maps to all zeros.
pub fn min_max_scale(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / range).collect()
}

/// Composite score per security.
///
/// Each present metric is min-max scaled across the batch and combined with the profile
/// weights renormalized over those metrics. `weight_assigned` is the score share of the
/// batch. Falls back to equal weights when nothing usable remains.
pub fn score(batch: &NormalizedBatch, weights: &WeightVector) -> ScoreOutcome {
    if batch.is_empty() {
        return ScoreOutcome {
            records: Vec::new(),
            mode: ScoringMode::Weighted,
            weights: None,
        };
    }

    if batch.present.is_empty() {
        return equal_weight(batch, ScoringFallback::NoUsableMetrics);
    }
    let Some(effective) = weights.restricted_to(&batch.present) else {
        return equal_weight(batch, ScoringFallback::ZeroWeights);
    };

    let mut scores = vec![0.0; batch.securities.len()];
    for metric in &batch.present {
        let w = effective.get(*metric);
        if w == 0.0 {
            continue;
        }
        let scaled = min_max_scale(&batch.column(*metric));
        for (score, v) in scores.iter_mut().zip(scaled) {
            *score += w * v;
        }
    }

    let total: f64 = scores.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return equal_weight(batch, ScoringFallback::ZeroTotalScore);
    }

    let records = batch
        .securities
        .iter()
        .zip(scores)
        .map(|(s, score)| ScoreRecord {
            ticker: s.ticker.clone(),
            name: s.name.clone(),
            sector: s.sector.clone(),
            score,
            weight_assigned: score / total,
        })
        .collect();

    ScoreOutcome {
        records,
        mode: ScoringMode::Weighted,
        weights: Some(effective),
    }
}

fn equal_weight(batch: &NormalizedBatch, reason: ScoringFallback) -> ScoreOutcome {
    tracing::warn!(?reason, securities = batch.securities.len(), "scoring with equal weights");
    let share = 1.0 / batch.securities.len() as f64;
    let records = batch
        .securities
        .iter()
        .map(|s| ScoreRecord {
            ticker: s.ticker.clone(),
            name: s.name.clone(),
            sector: s.sector.clone(),
            score: share,
            weight_assigned: share,
        })
        .collect();
    ScoreOutcome {
        records,
        mode: ScoringMode::EqualWeight { reason },
        weights: None,
    }
}
