pub mod analysis;
pub mod domain;
pub mod ingest;
pub mod llm;
pub mod storage;
pub mod time;

pub mod config {
    use crate::domain::profile::RiskLevel;
    use anyhow::Context;
    use std::path::PathBuf;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub openai_api_key: Option<String>,
        pub anthropic_api_key: Option<String>,
        pub sentry_dsn: Option<String>,
        pub market_data_base_url: Option<String>,
        pub data_dir: Option<String>,
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            Ok(Self {
                openai_api_key: non_empty_var("OPENAI_API_KEY"),
                anthropic_api_key: non_empty_var("ANTHROPIC_API_KEY"),
                sentry_dsn: non_empty_var("SENTRY_DSN"),
                market_data_base_url: non_empty_var("MARKET_DATA_BASE_URL"),
                data_dir: non_empty_var("CARTERA_DATA_DIR"),
            })
        }

        pub fn require_openai_api_key(&self) -> anyhow::Result<&str> {
            self.openai_api_key
                .as_deref()
                .context("OPENAI_API_KEY is required")
        }

        pub fn require_anthropic_api_key(&self) -> anyhow::Result<&str> {
            self.anthropic_api_key
                .as_deref()
                .context("ANTHROPIC_API_KEY is required")
        }
    }

    /// Parameters of one analysis run. Built once at startup and passed down explicitly.
    #[derive(Debug, Clone)]
    pub struct AnalysisConfig {
        /// Amount to invest, in whole currency units (CLP).
        pub budget: i64,
        pub risk_level: RiskLevel,
        pub dividend_preference: bool,
        /// Requested number of positions; the allocator never goes below 5 unless the batch is smaller.
        pub top_stocks_count: usize,
        pub min_investment: i64,
        pub data_dir: PathBuf,
        pub cache_retention_days: i64,
        pub fetch_concurrency: usize,
    }

    impl Default for AnalysisConfig {
        fn default() -> Self {
            Self {
                budget: 5_000_000,
                risk_level: RiskLevel::Moderate,
                dividend_preference: true,
                top_stocks_count: 5,
                min_investment: 20_000,
                data_dir: PathBuf::from("data/processed"),
                cache_retention_days: 7,
                fetch_concurrency: 5,
            }
        }
    }

    impl AnalysisConfig {
        pub fn from_env() -> Self {
            Self::default().overlay(|key| std::env::var(key).ok())
        }

        /// Applies `CARTERA_*` overrides from `lookup`; values that fail to parse keep the current setting.
        pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
            if let Some(n) = parse_var(&lookup, "CARTERA_BUDGET") {
                self.budget = n;
            }
            if let Some(s) = lookup("CARTERA_RISK_LEVEL") {
                if let Ok(level) = s.parse::<RiskLevel>() {
                    self.risk_level = level;
                }
            }
            if let Some(b) = lookup("CARTERA_DIVIDEND_PREFERENCE").and_then(|s| parse_flag(&s)) {
                self.dividend_preference = b;
            }
            if let Some(n) = parse_var(&lookup, "CARTERA_TOP_STOCKS") {
                self.top_stocks_count = n;
            }
            if let Some(n) = parse_var(&lookup, "CARTERA_MIN_INVESTMENT") {
                self.min_investment = n;
            }
            if let Some(s) = lookup("CARTERA_DATA_DIR").filter(|s| !s.trim().is_empty()) {
                self.data_dir = PathBuf::from(s);
            }
            if let Some(n) = parse_var(&lookup, "CARTERA_CACHE_RETENTION_DAYS") {
                self.cache_retention_days = n;
            }
            if let Some(n) = parse_var::<usize>(&lookup, "CARTERA_FETCH_CONCURRENCY") {
                self.fetch_concurrency = n.max(1);
            }
            self
        }
    }

    fn non_empty_var(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    fn parse_var<T: std::str::FromStr>(
        lookup: &impl Fn(&str) -> Option<String>,
        key: &str,
    ) -> Option<T> {
        lookup(key).and_then(|s| s.trim().parse::<T>().ok())
    }

    fn parse_flag(s: &str) -> Option<bool> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "si" | "sí" => Some(true),
            "0" | "false" | "no" => Some(false),
            _ => None,
        }
    }

}
