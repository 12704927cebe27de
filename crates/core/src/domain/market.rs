use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub total_securities: usize,
    pub dividend_payers: usize,
    pub average_price: Option<f64>,
    pub average_dividend_yield: Option<f64>,
    pub average_change_6m: Option<f64>,
    pub sectors: Vec<SectorCount>,
    pub top_performers: Vec<Highlight>,
    pub top_dividend_payers: Vec<Highlight>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorCount {
    pub sector: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Highlight {
    pub ticker: String,
    pub name: String,
    pub value: f64,
}
