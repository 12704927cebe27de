use crate::analysis::allocate::{ceil_to_unit, ROUNDING_UNIT};
use regex::{NoExpand, Regex};
use std::ops::Range;

const ENTRY_PATTERN: &str = r"- (.+?):\s*\$\s*([\d,]+)";
const TOTAL_PATTERN: &str = r"TOTAL:\s*\$\s*[\d,]+";

/// One `- label: $amount` line found in free-form distribution text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionEntry {
    pub label: String,
    pub amount: i64,
    line: usize,
    digits: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnchangedReason {
    NoEntries,
    AlreadyBalanced,
    /// The target is not a positive multiple of the rounding unit, or the entries
    /// cannot all reach the minimum within it.
    Infeasible,
    ParseFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Unchanged(UnchangedReason),
    Corrected {
        text: String,
        amounts: Vec<(String, i64)>,
    },
}

impl Reconciliation {
    pub fn into_text(self, original: &str) -> String {
        match self {
            Reconciliation::Unchanged(_) => original.to_string(),
            Reconciliation::Corrected { text, .. } => text,
        }
    }
}

/// Formats whole units with comma thousands separators: `1234567` -> `1,234,567`.
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

pub fn parse_distribution(text: &str) -> Vec<DistributionEntry> {
    let Ok(re) = Regex::new(ENTRY_PATTERN) else {
        return Vec::new();
    };
    let mut entries = Vec::new();
    for (line_no, line) in text.split('\n').enumerate() {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let (Some(label), Some(digits)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let trimmed = digits.as_str().trim_end_matches(',');
        let Ok(amount) = trimmed.replace(',', "").parse::<i64>() else {
            continue;
        };
        entries.push(DistributionEntry {
            label: label.as_str().trim().to_string(),
            amount,
            line: line_no,
            digits: digits.start()..digits.start() + trimmed.len(),
        });
    }
    entries
}

/// Rescales the amounts in `text` so they sum to `target`.
///
/// Only the digit spans of entry lines and any `TOTAL: $...` figure are rewritten; all
/// other bytes are preserved. Every entry except the last is scaled, floored to the
/// rounding unit and kept at or above the minimum; the last absorbs the remainder.
pub fn reconcile(text: &str, target: i64, min_investment: i64) -> Reconciliation {
    let entries = parse_distribution(text);
    if entries.is_empty() {
        return Reconciliation::Unchanged(UnchangedReason::NoEntries);
    }

    // No split of a non-roundable target keeps every amount on the unit.
    if target <= 0 || target % ROUNDING_UNIT != 0 {
        return Reconciliation::Unchanged(UnchangedReason::Infeasible);
    }
    let floor = ceil_to_unit(min_investment.max(0));
    let required = floor.checked_mul(entries.len() as i64);
    if required.map_or(true, |r| r > target) {
        return Reconciliation::Unchanged(UnchangedReason::Infeasible);
    }

    let Some(current) = entries
        .iter()
        .try_fold(0i64, |acc, e| acc.checked_add(e.amount))
    else {
        return Reconciliation::Unchanged(UnchangedReason::ParseFailure);
    };
    if current == target {
        return Reconciliation::Unchanged(UnchangedReason::AlreadyBalanced);
    }
    if current <= 0 {
        return Reconciliation::Unchanged(UnchangedReason::ParseFailure);
    }

    let Some(amounts) = rescale(&entries, current, target, floor) else {
        return Reconciliation::Unchanged(UnchangedReason::Infeasible);
    };

    let Ok(total_re) = Regex::new(TOTAL_PATTERN) else {
        return Reconciliation::Unchanged(UnchangedReason::ParseFailure);
    };

    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    for (entry, amount) in entries.iter().zip(&amounts) {
        if let Some(line) = lines.get_mut(entry.line) {
            line.replace_range(entry.digits.clone(), &format_amount(*amount));
        }
    }
    let joined = lines.join("\n");
    let total_line = format!("TOTAL: ${}", format_amount(target));
    let corrected = total_re.replace_all(&joined, NoExpand(&total_line)).into_owned();

    Reconciliation::Corrected {
        text: corrected,
        amounts: entries
            .iter()
            .map(|e| e.label.clone())
            .zip(amounts)
            .collect(),
    }
}

fn rescale(entries: &[DistributionEntry], current: i64, target: i64, floor: i64) -> Option<Vec<i64>> {
    let last = entries.len() - 1;
    let mut amounts: Vec<i64> = entries[..last]
        .iter()
        .map(|e| {
            let scaled = (e.amount as i128 * target as i128 / current as i128) as i64;
            (scaled.div_euclid(ROUNDING_UNIT) * ROUNDING_UNIT).max(floor)
        })
        .collect();

    let assigned: i64 = amounts.iter().sum();
    let mut remainder = target - assigned;
    if remainder < floor {
        let mut deficit = floor - remainder;
        remainder = floor;
        while deficit > 0 {
            let donor = amounts
                .iter()
                .enumerate()
                .filter(|(_, a)| **a > floor)
                .max_by(|(i, a), (j, b)| a.cmp(b).then_with(|| j.cmp(i)))
                .map(|(i, _)| i)?;
            let step = ROUNDING_UNIT.min(deficit).min(amounts[donor] - floor);
            amounts[donor] -= step;
            deficit -= step;
        }
    }
    amounts.push(remainder);
    Some(amounts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_thousands() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(999), "999");
        assert_eq!(format_amount(1_000), "1,000");
        assert_eq!(format_amount(1_234_567), "1,234,567");
        assert_eq!(format_amount(-20_000), "-20,000");
    }

    #[test]
    fn scales_two_entries_to_target() {
        let text = "- A: $30,000\n- B: $50,000";
        match reconcile(text, 100_000, 20_000) {
            Reconciliation::Corrected { text, amounts } => {
                assert_eq!(text, "- A: $37,000\n- B: $63,000");
                assert_eq!(
                    amounts,
                    vec![("A".to_string(), 37_000), ("B".to_string(), 63_000)]
                );
            }
            other => panic!("expected correction, got {other:?}"),
        }
    }

    #[test]
    fn balanced_text_round_trips_byte_for_byte() {
        let text = "### Distribution\r\n\n- **BCI.SN** (Banca): $ 40,000 CLP\n- CHILE.SN: $60,000,\n\n**TOTAL: $ 100,000**\n";
        let result = reconcile(text, 100_000, 20_000);
        assert_eq!(result, Reconciliation::Unchanged(UnchangedReason::AlreadyBalanced));
        assert_eq!(result.into_text(text), text);
    }

    #[test]
    fn rewrites_only_amounts_and_total() {
        let text = "Intro line.\n- **BCI.SN** (Banca): $ 40,000 CLP (40%)\n- CHILE.SN: $40,000, solid\n\n**TOTAL: $ 80,000**\nClosing.";
        let corrected = reconcile(text, 100_000, 20_000).into_text(text);
        assert_eq!(
            corrected,
            "Intro line.\n- **BCI.SN** (Banca): $ 50,000 CLP (40%)\n- CHILE.SN: $50,000, solid\n\n**TOTAL: $100,000**\nClosing."
        );
    }

    #[test]
    fn no_entries_is_reported() {
        assert_eq!(
            reconcile("nothing to see here", 100_000, 20_000),
            Reconciliation::Unchanged(UnchangedReason::NoEntries)
        );
    }

    #[test]
    fn infeasible_minimum_leaves_text_alone() {
        let text = (1..=6)
            .map(|i| format!("- T{i}: $10,000"))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(
            reconcile(&text, 100_000, 20_000),
            Reconciliation::Unchanged(UnchangedReason::Infeasible)
        );
    }

    #[test]
    fn non_roundable_target_leaves_text_alone() {
        let text = "- A: $30,000\n- B: $50,000";
        assert_eq!(
            reconcile(text, 100_500, 20_000),
            Reconciliation::Unchanged(UnchangedReason::Infeasible)
        );
        assert_eq!(
            reconcile(text, 0, 0),
            Reconciliation::Unchanged(UnchangedReason::Infeasible)
        );
    }

    #[test]
    fn zero_amounts_cannot_be_scaled() {
        assert_eq!(
            reconcile("- A: $0\n- B: $0", 100_000, 20_000),
            Reconciliation::Unchanged(UnchangedReason::ParseFailure)
        );
    }

    #[test]
    fn last_entry_is_topped_up_from_largest() {
        // Scaling floors A and B at the minimum-or-more, leaving C short.
        let text = "- A: $90,000\n- B: $90,000\n- C: $1,000";
        let Reconciliation::Corrected { amounts, .. } = reconcile(text, 100_000, 20_000) else {
            panic!("expected correction");
        };
        let values: Vec<i64> = amounts.iter().map(|(_, a)| *a).collect();
        assert_eq!(values.iter().sum::<i64>(), 100_000);
        assert!(values.iter().all(|a| *a >= 20_000 && a % 1_000 == 0));
        assert_eq!(values, vec![40_000, 40_000, 20_000]);
    }

    #[test]
    fn corrected_output_satisfies_invariants() {
        let text = "- A: $123,456\n- B: $7,890\n- C: $45,000\n- D: $300,000\nTOTAL: $476,346";
        let corrected = reconcile(text, 1_000_000, 20_000).into_text(text);
        let entries = parse_distribution(&corrected);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries.iter().map(|e| e.amount).sum::<i64>(), 1_000_000);
        assert!(entries.iter().all(|e| e.amount >= 20_000));
        assert!(corrected.ends_with("TOTAL: $1,000,000"));
        assert_eq!(
            reconcile(&corrected, 1_000_000, 20_000),
            Reconciliation::Unchanged(UnchangedReason::AlreadyBalanced)
        );
    }
}
