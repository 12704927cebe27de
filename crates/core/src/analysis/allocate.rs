use crate::domain::recommendation::{AllocationItem, ScoreRecord, SectorTotal};
use std::collections::BTreeMap;
use std::fmt;

pub const ROUNDING_UNIT: i64 = 1_000;
pub const MIN_POSITIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationParams {
    pub budget: i64,
    /// Requested positions; raised to `MIN_POSITIONS` and capped by the batch size.
    pub min_companies: usize,
    pub min_investment: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    EmptyBatch,
    InvalidBudget { budget: i64 },
    BudgetNotRoundable { budget: i64 },
    Infeasible {
        budget: i64,
        positions: usize,
        min_investment: i64,
    },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::EmptyBatch => write!(f, "no scored securities to allocate"),
            AllocationError::InvalidBudget { budget } => {
                write!(f, "budget must be positive (got {budget})")
            }
            AllocationError::BudgetNotRoundable { budget } => write!(
                f,
                "budget {budget} is not a multiple of {ROUNDING_UNIT}"
            ),
            AllocationError::Infeasible {
                budget,
                positions,
                min_investment,
            } => write!(
                f,
                "budget {budget} cannot give {positions} positions at least {min_investment} each"
            ),
        }
    }
}

impl std::error::Error for AllocationError {}

pub fn selection_size(min_companies: usize, batch_len: usize) -> usize {
    min_companies.max(MIN_POSITIONS).min(batch_len)
}

/// Splits `budget` over the top-ranked securities.
///
/// Amounts are multiples of `ROUNDING_UNIT`, each at least the (rounded up) minimum,
/// and always sum to exactly `budget`. Ties in `weight_assigned` rank by ticker.
pub fn allocate(
    records: &[ScoreRecord],
    params: &AllocationParams,
) -> Result<Vec<AllocationItem>, AllocationError> {
    let budget = params.budget;
    if records.is_empty() {
        return Err(AllocationError::EmptyBatch);
    }
    if budget <= 0 {
        return Err(AllocationError::InvalidBudget { budget });
    }
    if budget % ROUNDING_UNIT != 0 {
        return Err(AllocationError::BudgetNotRoundable { budget });
    }

    let floor = ceil_to_unit(params.min_investment.max(0));
    let n = selection_size(params.min_companies, records.len());
    let required = floor.checked_mul(n as i64);
    if required.map_or(true, |r| r > budget) {
        return Err(AllocationError::Infeasible {
            budget,
            positions: n,
            min_investment: floor,
        });
    }

    let mut ranked: Vec<&ScoreRecord> = records.iter().collect();
    ranked.sort_by(|a, b| {
        sane(b.weight_assigned)
            .total_cmp(&sane(a.weight_assigned))
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    ranked.truncate(n);

    let weights = selection_weights(&ranked);
    let mut amounts: Vec<i64> = weights
        .iter()
        .map(|w| floor_to_unit(w * budget as f64))
        .collect();

    repair_minimum(&mut amounts, &weights, budget, floor);
    settle_residual(&mut amounts, budget, floor);

    Ok(ranked
        .into_iter()
        .zip(amounts)
        .map(|(r, amount)| AllocationItem {
            ticker: r.ticker.clone(),
            name: r.name.clone(),
            sector: r.sector.clone(),
            score: r.score,
            weight_assigned: r.weight_assigned,
            percentage: amount as f64 / budget as f64 * 100.0,
            amount,
        })
        .collect())
}

/// Sums amounts and percentages per sector, largest amount first.
pub fn sector_rollup(items: &[AllocationItem]) -> Vec<SectorTotal> {
    let mut by_sector: BTreeMap<&str, (i64, f64)> = BTreeMap::new();
    for item in items {
        let entry = by_sector.entry(item.sector.as_str()).or_default();
        entry.0 += item.amount;
        entry.1 += item.percentage;
    }
    let mut totals: Vec<SectorTotal> = by_sector
        .into_iter()
        .map(|(sector, (amount, percentage))| SectorTotal {
            sector: sector.to_string(),
            amount,
            percentage,
        })
        .collect();
    totals.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.sector.cmp(&b.sector)));
    totals
}

pub fn ceil_to_unit(x: i64) -> i64 {
    let rem = x.rem_euclid(ROUNDING_UNIT);
    if rem == 0 {
        x
    } else {
        x + (ROUNDING_UNIT - rem)
    }
}

fn floor_to_unit(x: f64) -> i64 {
    ((x + 1e-6) / ROUNDING_UNIT as f64).floor() as i64 * ROUNDING_UNIT
}

fn round_to_unit(x: f64) -> i64 {
    (x / ROUNDING_UNIT as f64).round() as i64 * ROUNDING_UNIT
}

fn sane(w: f64) -> f64 {
    if w.is_finite() && w > 0.0 {
        w
    } else {
        0.0
    }
}

fn selection_weights(ranked: &[&ScoreRecord]) -> Vec<f64> {
    let total: f64 = ranked.iter().map(|r| sane(r.weight_assigned)).sum();
    if total > 0.0 {
        ranked.iter().map(|r| sane(r.weight_assigned) / total).collect()
    } else {
        vec![1.0 / ranked.len() as f64; ranked.len()]
    }
}

/// Lifts positions below `floor` to it and re-spreads what is left over the others
/// by weight, until no position is below `floor`.
fn repair_minimum(amounts: &mut [i64], weights: &[f64], budget: i64, floor: i64) {
    let mut pinned = vec![false; amounts.len()];
    loop {
        let low: Vec<usize> = (0..amounts.len())
            .filter(|&i| !pinned[i] && amounts[i] < floor)
            .collect();
        if low.is_empty() {
            return;
        }
        for i in low {
            pinned[i] = true;
            amounts[i] = floor;
        }

        let free: Vec<usize> = (0..amounts.len()).filter(|&i| !pinned[i]).collect();
        if free.is_empty() {
            return;
        }
        let pinned_total = floor * (amounts.len() - free.len()) as i64;
        let remaining = (budget - pinned_total) as f64;
        let free_weight: f64 = free.iter().map(|&i| weights[i]).sum();
        for &i in &free {
            let share = if free_weight > 0.0 {
                weights[i] / free_weight
            } else {
                1.0 / free.len() as f64
            };
            amounts[i] = round_to_unit(share * remaining);
        }
    }
}

/// Moves the rounding residual onto the largest position. If that would push it
/// below `floor`, the overflow is taken from the next largest positions in unit steps.
fn settle_residual(amounts: &mut [i64], budget: i64, floor: i64) {
    let residual = budget - amounts.iter().sum::<i64>();
    if residual == 0 {
        return;
    }
    let Some(largest) = index_of_largest(amounts, |_| true) else {
        return;
    };
    let adjusted = amounts[largest] + residual;
    if adjusted >= floor {
        amounts[largest] = adjusted;
        return;
    }

    let mut deficit = floor - adjusted;
    amounts[largest] = floor;
    while deficit > 0 {
        let Some(donor) = index_of_largest(amounts, |a| a > floor) else {
            break;
        };
        let step = ROUNDING_UNIT.min(deficit).min(amounts[donor] - floor);
        amounts[donor] -= step;
        deficit -= step;
    }
}

fn index_of_largest(amounts: &[i64], eligible: impl Fn(i64) -> bool) -> Option<usize> {
    amounts
        .iter()
        .enumerate()
        .filter(|(_, a)| eligible(**a))
        .max_by(|(i, a), (j, b)| a.cmp(b).then_with(|| j.cmp(i)))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(ticker: &str, sector: &str, weight: f64) -> ScoreRecord {
        ScoreRecord {
            ticker: ticker.to_string(),
            name: format!("{ticker} SA"),
            sector: sector.to_string(),
            score: weight,
            weight_assigned: weight,
        }
    }

    fn params(budget: i64, min_companies: usize, min_investment: i64) -> AllocationParams {
        AllocationParams {
            budget,
            min_companies,
            min_investment,
        }
    }

    fn assert_invariants(items: &[AllocationItem], budget: i64, floor: i64) {
        assert_eq!(items.iter().map(|i| i.amount).sum::<i64>(), budget);
        for item in items {
            assert!(item.amount >= floor, "{} got {}", item.ticker, item.amount);
            assert_eq!(item.amount % ROUNDING_UNIT, 0);
        }
        let pct: f64 = items.iter().map(|i| i.percentage).sum();
        assert!((pct - 100.0).abs() < 1e-6);
    }

    #[test]
    fn equal_scores_split_evenly() {
        let records: Vec<_> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|t| record(t, "Banca", 0.2))
            .collect();
        let items = allocate(&records, &params(100_000, 5, 20_000)).unwrap();
        assert_eq!(items.len(), 5);
        assert!(items.iter().all(|i| i.amount == 20_000));
    }

    #[test]
    fn skewed_weights_respect_minimum_and_budget() {
        let records = vec![
            record("A", "Banca", 0.70),
            record("B", "Retail", 0.20),
            record("C", "Retail", 0.05),
            record("D", "AFP", 0.03),
            record("E", "AFP", 0.015),
            record("F", "AFP", 0.005),
        ];
        let items = allocate(&records, &params(1_000_000, 5, 20_000)).unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[0].ticker, "A");
        assert!(items.iter().all(|i| i.ticker != "F"));
        assert_invariants(&items, 1_000_000, 20_000);
    }

    #[test]
    fn budget_is_conserved_across_shapes() {
        let weights = [0.31, 0.17, 0.13, 0.11, 0.09, 0.07, 0.05, 0.04, 0.02, 0.01];
        let records: Vec<_> = weights
            .iter()
            .enumerate()
            .map(|(i, w)| record(&format!("T{i:02}"), "Banca", *w))
            .collect();
        for budget in [100_000, 137_000, 1_000_000, 5_000_000, 9_999_000] {
            for min_companies in [1, 5, 7, 10, 20] {
                for min_investment in [0, 10_000, 20_000] {
                    let p = params(budget, min_companies, min_investment);
                    let n = selection_size(min_companies, records.len());
                    if min_investment * n as i64 > budget {
                        assert!(matches!(
                            allocate(&records, &p),
                            Err(AllocationError::Infeasible { .. })
                        ));
                        continue;
                    }
                    let items = allocate(&records, &p).unwrap();
                    assert_eq!(items.len(), n);
                    assert_invariants(&items, budget, min_investment);
                }
            }
        }
    }

    #[test]
    fn tight_budget_spills_overflow_to_next_largest() {
        // Re-spreading 82,000 over four positions rounds each 20,500 up, overshooting by 2,000.
        let records = vec![
            record("A", "Banca", 0.25),
            record("B", "Banca", 0.25),
            record("C", "Banca", 0.25),
            record("D", "Banca", 0.25),
            record("E", "Banca", 0.0),
        ];
        let items = allocate(&records, &params(102_000, 5, 20_000)).unwrap();
        assert_invariants(&items, 102_000, 20_000);
        let amounts: Vec<_> = items.iter().map(|i| i.amount).collect();
        assert_eq!(amounts, vec![20_000, 20_000, 21_000, 21_000, 20_000]);
    }

    #[test]
    fn infeasible_when_minimum_exceeds_budget() {
        let records: Vec<_> = ["A", "B", "C", "D", "E"]
            .iter()
            .map(|t| record(t, "Banca", 0.2))
            .collect();
        let err = allocate(&records, &params(50_000, 5, 20_000)).unwrap_err();
        assert_eq!(
            err,
            AllocationError::Infeasible {
                budget: 50_000,
                positions: 5,
                min_investment: 20_000
            }
        );
    }

    #[test]
    fn rejects_bad_inputs() {
        let records = vec![record("A", "Banca", 1.0)];
        assert_eq!(
            allocate(&[], &params(100_000, 5, 0)).unwrap_err(),
            AllocationError::EmptyBatch
        );
        assert_eq!(
            allocate(&records, &params(0, 5, 0)).unwrap_err(),
            AllocationError::InvalidBudget { budget: 0 }
        );
        assert_eq!(
            allocate(&records, &params(100_500, 5, 0)).unwrap_err(),
            AllocationError::BudgetNotRoundable { budget: 100_500 }
        );
    }

    #[test]
    fn small_batch_gets_everything() {
        let records = vec![record("A", "Banca", 0.6), record("B", "Retail", 0.4)];
        let items = allocate(&records, &params(100_000, 5, 20_000)).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].amount, 60_000);
        assert_eq!(items[1].amount, 40_000);
    }

    #[test]
    fn ties_rank_by_ticker() {
        let records = vec![
            record("ZETA", "Banca", 0.1),
            record("ALFA", "Banca", 0.1),
            record("MID", "Banca", 0.1),
            record("BETA", "Banca", 0.1),
            record("OMEGA", "Banca", 0.1),
            record("GAMMA", "Banca", 0.1),
        ];
        let items = allocate(&records, &params(100_000, 5, 0)).unwrap();
        let tickers: Vec<_> = items.iter().map(|i| i.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["ALFA", "BETA", "GAMMA", "MID", "OMEGA"]);
    }

    #[test]
    fn minimum_is_rounded_up_to_unit() {
        assert_eq!(ceil_to_unit(20_000), 20_000);
        assert_eq!(ceil_to_unit(20_001), 21_000);
        assert_eq!(ceil_to_unit(0), 0);
        let records: Vec<_> = ["A", "B", "C", "D", "E"]
            .iter()
            .zip([0.9, 0.04, 0.03, 0.02, 0.01])
            .map(|(t, w)| record(t, "Banca", w))
            .collect();
        let items = allocate(&records, &params(200_000, 5, 20_500)).unwrap();
        assert_invariants(&items, 200_000, 21_000);
    }

    #[test]
    fn sectors_roll_up() {
        let records = vec![
            record("A", "Banca", 0.4),
            record("B", "Retail", 0.3),
            record("C", "Banca", 0.3),
        ];
        let items = allocate(&records, &params(100_000, 5, 0)).unwrap();
        let sectors = sector_rollup(&items);
        assert_eq!(sectors.len(), 2);
        assert_eq!(sectors[0].sector, "Banca");
        assert_eq!(sectors[0].amount, 70_000);
        assert_eq!(sectors[1].amount, 30_000);
        assert!((sectors[0].percentage - 70.0).abs() < 1e-9);
    }
}
