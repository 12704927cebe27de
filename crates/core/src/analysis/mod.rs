pub mod allocate;
pub mod distribution;
pub mod normalize;
pub mod reconcile;
pub mod report;
pub mod score;
pub mod summary;
pub mod weights;

use crate::analysis::allocate::{AllocationError, AllocationParams};
use crate::analysis::reconcile::{Reconciliation, UnchangedReason};
use crate::analysis::score::ScoreOutcome;
use crate::analysis::weights::WeightVector;
use crate::config::AnalysisConfig;
use crate::domain::market::MarketSummary;
use crate::domain::recommendation::{
    Distribution, DistributionFallback, DistributionSource, Recommendation, RunSnapshot,
    ScoreRecord, ScoringMode,
};
use crate::domain::security::SecurityMetrics;
use crate::llm::{prompt, AdvisorClient};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Result of one end-to-end analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
    pub recommendation: Recommendation,
    /// Every scored security, not only the selected ones.
    pub scored: Vec<ScoreRecord>,
    pub weights: Option<WeightVector>,
    pub market_summary: MarketSummary,
    pub analysis: String,
    pub distribution: Distribution,
}

impl AnalysisRun {
    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            recommendation: self.recommendation.clone(),
            distribution: self.distribution.clone(),
            analysis: self.analysis.clone(),
            market_summary: self.market_summary.clone(),
        }
    }
}

impl AllocationParams {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            budget: config.budget,
            min_companies: config.top_stocks_count,
            min_investment: config.min_investment,
        }
    }
}

pub fn score_batch(batch: &[SecurityMetrics], config: &AnalysisConfig) -> ScoreOutcome {
    let prepared = normalize::prepare(batch, config.dividend_preference);
    let normalized = normalize::normalize(&prepared);
    let weights = WeightVector::for_profile(config.risk_level, config.dividend_preference);
    score::score(&normalized, &weights)
}

pub fn recommend(
    outcome: &ScoreOutcome,
    config: &AnalysisConfig,
    as_of_date: NaiveDate,
    generated_at: DateTime<Utc>,
) -> Result<Recommendation, AllocationError> {
    let items = allocate::allocate(&outcome.records, &AllocationParams::from_config(config))?;
    let sectors = allocate::sector_rollup(&items);
    Ok(Recommendation {
        run_id: Uuid::new_v4(),
        as_of_date,
        generated_at,
        budget: config.budget,
        total_invested: items.iter().map(|i| i.amount).sum(),
        risk_level: config.risk_level,
        items,
        sectors,
        scoring_mode: outcome.mode,
    })
}

/// Scores, allocates and, when an advisor is available, asks it for a narrative
/// analysis and a distribution that is then forced back onto the budget.
pub async fn run_analysis(
    batch: &[SecurityMetrics],
    config: &AnalysisConfig,
    advisor: Option<&dyn AdvisorClient>,
    as_of_date: NaiveDate,
    generated_at: DateTime<Utc>,
) -> anyhow::Result<AnalysisRun> {
    let outcome = score_batch(batch, config);
    let recommendation = recommend(&outcome, config, as_of_date, generated_at)?;
    tracing::info!(
        scored = outcome.records.len(),
        selected = recommendation.items.len(),
        total_invested = recommendation.total_invested,
        mode = ?recommendation.scoring_mode,
        "allocation complete"
    );

    let market_summary = summary::market_summary(batch);
    let analysis = business_analysis(advisor, batch).await;
    let distribution =
        advise_distribution(advisor, &analysis, &outcome.records, &recommendation, config).await;

    Ok(AnalysisRun {
        recommendation,
        scored: outcome.records,
        weights: outcome.weights,
        market_summary,
        analysis,
        distribution,
    })
}

async fn business_analysis(advisor: Option<&dyn AdvisorClient>, batch: &[SecurityMetrics]) -> String {
    let Some(advisor) = advisor else {
        return distribution::fallback_analysis(batch);
    };
    match advisor.generate(prompt::business_analysis_request(batch)).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            tracing::warn!(provider = advisor.provider().as_str(), "empty analysis; using fallback");
            distribution::fallback_analysis(batch)
        }
        Err(err) => {
            tracing::warn!(provider = advisor.provider().as_str(), error = %err, "analysis request failed; using fallback");
            distribution::fallback_analysis(batch)
        }
    }
}

async fn advise_distribution(
    advisor: Option<&dyn AdvisorClient>,
    analysis: &str,
    scored: &[ScoreRecord],
    recommendation: &Recommendation,
    config: &AnalysisConfig,
) -> Distribution {
    let computed = |reason: DistributionFallback| Distribution {
        text: distribution::render_distribution(recommendation),
        source: DistributionSource::Computed { reason },
    };

    let Some(advisor) = advisor else {
        return computed(DistributionFallback::NoClient);
    };
    let provider = advisor.provider().as_str().to_string();
    let request = prompt::distribution_request(analysis, scored, config);
    let text = match advisor.generate(request).await {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(provider = %provider, error = %err, "distribution request failed");
            return computed(DistributionFallback::RequestFailed);
        }
    };

    match reconcile::reconcile(&text, config.budget, config.min_investment) {
        Reconciliation::Corrected { text, amounts } => {
            tracing::info!(provider = %provider, entries = amounts.len(), "distribution corrected to budget");
            Distribution {
                text,
                source: DistributionSource::Llm {
                    provider,
                    corrected: true,
                },
            }
        }
        Reconciliation::Unchanged(UnchangedReason::AlreadyBalanced) => {
            if !respects_rounding(&text, config.min_investment) {
                tracing::warn!(provider = %provider, "balanced distribution breaks minimum or rounding");
                return computed(DistributionFallback::ViolatesConstraints);
            }
            Distribution {
                text,
                source: DistributionSource::Llm {
                    provider,
                    corrected: false,
                },
            }
        }
        Reconciliation::Unchanged(reason) => {
            tracing::warn!(provider = %provider, ?reason, "distribution unusable; using computed");
            let fallback = match reason {
                UnchangedReason::NoEntries => DistributionFallback::NoEntries,
                UnchangedReason::Infeasible => DistributionFallback::Infeasible,
                UnchangedReason::AlreadyBalanced | UnchangedReason::ParseFailure => {
                    DistributionFallback::Unparseable
                }
            };
            computed(fallback)
        }
    }
}

fn respects_rounding(text: &str, min_investment: i64) -> bool {
    let floor = allocate::ceil_to_unit(min_investment.max(0));
    reconcile::parse_distribution(text)
        .iter()
        .all(|e| e.amount >= floor && e.amount % allocate::ROUNDING_UNIT == 0)
}

/// Scoring degraded to equal weights for this run.
pub fn is_degraded(recommendation: &Recommendation) -> bool {
    matches!(recommendation.scoring_mode, ScoringMode::EqualWeight { .. })
}
