use crate::domain::market::MarketSummary;
use crate::domain::profile::RiskLevel;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub score: f64,
    /// Score share of the batch; sums to 1 across all records.
    pub weight_assigned: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationItem {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub score: f64,
    pub weight_assigned: f64,
    pub percentage: f64,
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorTotal {
    pub sector: String,
    pub amount: i64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringFallback {
    /// No metric had a value for any security.
    NoUsableMetrics,
    /// The metrics that had values all carry zero weight for this profile.
    ZeroWeights,
    /// Every security scored zero.
    ZeroTotalScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScoringMode {
    Weighted,
    EqualWeight { reason: ScoringFallback },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub run_id: Uuid,
    pub as_of_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub budget: i64,
    pub total_invested: i64,
    pub risk_level: RiskLevel,
    pub items: Vec<AllocationItem>,
    pub sectors: Vec<SectorTotal>,
    pub scoring_mode: ScoringMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionFallback {
    NoClient,
    RequestFailed,
    NoEntries,
    Infeasible,
    Unparseable,
    /// The text balanced to the budget but broke the minimum or rounding rules.
    ViolatesConstraints,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DistributionSource {
    Llm { provider: String, corrected: bool },
    Computed { reason: DistributionFallback },
}

/// Human-readable allocation that accompanies a recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    pub text: String,
    pub source: DistributionSource,
}

/// Everything persisted for one run; the API serves these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub recommendation: Recommendation,
    pub distribution: Distribution,
    pub analysis: String,
    pub market_summary: MarketSummary,
}

impl RunSnapshot {
    pub fn item(&self, ticker: &str) -> Option<&AllocationItem> {
        self.recommendation
            .items
            .iter()
            .find(|item| item.ticker.eq_ignore_ascii_case(ticker))
    }
}
