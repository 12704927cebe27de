use crate::domain::security::SecurityMetrics;
use serde::{Deserialize, Serialize};

/// One tradable security in the analyzed universe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub ticker: String,
    pub name: String,
    pub sector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchFailure {
    pub ticker: String,
    pub error: String,
}

/// Outcome of fetching a whole universe. Failed securities are excluded from `items`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchReport {
    pub items: Vec<SecurityMetrics>,
    pub failures: Vec<FetchFailure>,
}

impl FetchReport {
    pub fn attempted(&self) -> usize {
        self.items.len() + self.failures.len()
    }
}
