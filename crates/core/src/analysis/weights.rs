use crate::domain::profile::RiskLevel;
use crate::domain::security::Metric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Importance per metric. Raw profile vectors need not sum to 1; scoring renormalizes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    weights: BTreeMap<Metric, f64>,
}

impl WeightVector {
    pub fn base() -> Self {
        Self::from_pairs(&[
            (Metric::Roe, 0.15),
            (Metric::PeRatio, 0.10),
            (Metric::RevenueGrowth, 0.10),
            (Metric::EarningsGrowth, 0.15),
            (Metric::Beta, 0.05),
            (Metric::CashFlowToDebt, 0.15),
            (Metric::DividendYield, 0.15),
            (Metric::DividendPerShare, 0.10),
            (Metric::Change1M, 0.02),
            (Metric::Change6M, 0.03),
            (Metric::Volatility, 0.0),
        ])
    }

    pub fn for_profile(risk_level: RiskLevel, dividend_preference: bool) -> Self {
        let mut w = Self::base();
        match risk_level {
            RiskLevel::Conservative => {
                w.set(Metric::DividendYield, 0.25);
                w.set(Metric::CashFlowToDebt, 0.20);
                w.set(Metric::Beta, 0.02);
                w.set(Metric::Volatility, 0.02);
                w.set(Metric::EarningsGrowth, 0.10);
                w.set(Metric::Roe, 0.15);
            }
            RiskLevel::Aggressive => {
                w.set(Metric::EarningsGrowth, 0.25);
                w.set(Metric::RevenueGrowth, 0.15);
                w.set(Metric::Change6M, 0.08);
                w.set(Metric::Change1M, 0.05);
                w.set(Metric::Roe, 0.20);
                w.set(Metric::DividendYield, 0.10);
            }
            RiskLevel::Moderate => {}
        }

        if dividend_preference {
            w.adjust(Metric::DividendYield, 0.05);
            w.adjust(Metric::DividendPerShare, 0.03);
            w.adjust(Metric::RevenueGrowth, -0.03);
            w.adjust(Metric::Change1M, -0.02);
            w.adjust(Metric::Change6M, -0.03);
        }
        w
    }

    fn from_pairs(pairs: &[(Metric, f64)]) -> Self {
        Self {
            weights: pairs.iter().copied().collect(),
        }
    }

    fn set(&mut self, metric: Metric, value: f64) {
        self.weights.insert(metric, value.max(0.0));
    }

    fn adjust(&mut self, metric: Metric, delta: f64) {
        let current = self.get(metric);
        self.set(metric, current + delta);
    }

    pub fn get(&self, metric: Metric) -> f64 {
        self.weights.get(&metric).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        self.weights.iter().map(|(m, w)| (*m, *w))
    }

    /// Keeps only `present` metrics and rescales them to sum to 1.
    /// Returns `None` when the kept weights sum to zero.
    pub fn restricted_to(&self, present: &[Metric]) -> Option<WeightVector> {
        let kept: BTreeMap<Metric, f64> = present
            .iter()
            .map(|m| (*m, self.get(*m)))
            .collect();
        let total: f64 = kept.values().sum();
        if total.is_nan() || total <= 0.0 {
            return None;
        }
        Some(WeightVector {
            weights: kept.into_iter().map(|(m, w)| (m, w / total)).collect(),
        })
    }
}
