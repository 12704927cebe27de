use serde::{Deserialize, Serialize};

/// Scoring dimensions. Order is the column order used by storage and prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Roe,
    PeRatio,
    RevenueGrowth,
    EarningsGrowth,
    Beta,
    CashFlowToDebt,
    DividendYield,
    DividendPerShare,
    #[serde(rename = "change_1m")]
    Change1M,
    #[serde(rename = "change_6m")]
    Change6M,
    Volatility,
}

impl Metric {
    pub const ALL: [Metric; 11] = [
        Metric::Roe,
        Metric::PeRatio,
        Metric::RevenueGrowth,
        Metric::EarningsGrowth,
        Metric::Beta,
        Metric::CashFlowToDebt,
        Metric::DividendYield,
        Metric::DividendPerShare,
        Metric::Change1M,
        Metric::Change6M,
        Metric::Volatility,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Metric::Roe => "roe",
            Metric::PeRatio => "pe_ratio",
            Metric::RevenueGrowth => "revenue_growth",
            Metric::EarningsGrowth => "earnings_growth",
            Metric::Beta => "beta",
            Metric::CashFlowToDebt => "cash_flow_to_debt",
            Metric::DividendYield => "dividend_yield",
            Metric::DividendPerShare => "dividend_per_share",
            Metric::Change1M => "change_1m",
            Metric::Change6M => "change_6m",
            Metric::Volatility => "volatility",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Raw per-security fundamentals. `None` means the provider had no usable value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub roe: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub revenue_growth: Option<f64>,
    pub earnings_growth: Option<f64>,
    pub beta: Option<f64>,
    pub cash_flow_to_debt: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub dividend_per_share: Option<f64>,
    pub change_1m: Option<f64>,
    pub change_6m: Option<f64>,
    pub volatility: Option<f64>,
}

impl Fundamentals {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Roe => self.roe,
            Metric::PeRatio => self.pe_ratio,
            Metric::RevenueGrowth => self.revenue_growth,
            Metric::EarningsGrowth => self.earnings_growth,
            Metric::Beta => self.beta,
            Metric::CashFlowToDebt => self.cash_flow_to_debt,
            Metric::DividendYield => self.dividend_yield,
            Metric::DividendPerShare => self.dividend_per_share,
            Metric::Change1M => self.change_1m,
            Metric::Change6M => self.change_6m,
            Metric::Volatility => self.volatility,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        let slot = match metric {
            Metric::Roe => &mut self.roe,
            Metric::PeRatio => &mut self.pe_ratio,
            Metric::RevenueGrowth => &mut self.revenue_growth,
            Metric::EarningsGrowth => &mut self.earnings_growth,
            Metric::Beta => &mut self.beta,
            Metric::CashFlowToDebt => &mut self.cash_flow_to_debt,
            Metric::DividendYield => &mut self.dividend_yield,
            Metric::DividendPerShare => &mut self.dividend_per_share,
            Metric::Change1M => &mut self.change_1m,
            Metric::Change6M => &mut self.change_6m,
            Metric::Volatility => &mut self.volatility,
        };
        *slot = value;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityMetrics {
    pub ticker: String,
    pub name: String,
    pub sector: String,
    pub price: Option<f64>,
    pub fundamentals: Fundamentals,
    pub change_1y: Option<f64>,
    pub profit_margin: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub market_cap: Option<f64>,
    /// Most recent dividend amounts, oldest first.
    #[serde(default)]
    pub recent_dividends: Vec<f64>,
}

impl SecurityMetrics {
    pub fn new(ticker: impl Into<String>, name: impl Into<String>, sector: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            name: name.into(),
            sector: sector.into(),
            price: None,
            fundamentals: Fundamentals::default(),
            change_1y: None,
            profit_margin: None,
            debt_to_equity: None,
            market_cap: None,
            recent_dividends: Vec::new(),
        }
    }

    pub fn pays_dividends(&self) -> bool {
        matches!(self.fundamentals.dividend_yield, Some(y) if y.is_finite() && y > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_set_cover_every_metric() {
        let mut f = Fundamentals::default();
        for (i, metric) in Metric::ALL.iter().enumerate() {
            assert_eq!(metric.index(), i);
            f.set(*metric, Some(i as f64));
        }
        for (i, metric) in Metric::ALL.iter().enumerate() {
            assert_eq!(f.get(*metric), Some(i as f64));
        }
    }

    #[test]
    fn pays_dividends_requires_positive_finite_yield() {
        let mut s = SecurityMetrics::new("CHILE.SN", "Banco de Chile", "Banca");
        assert!(!s.pays_dividends());
        s.fundamentals.dividend_yield = Some(f64::NAN);
        assert!(!s.pays_dividends());
        s.fundamentals.dividend_yield = Some(0.05);
        assert!(s.pays_dividends());
    }
}
