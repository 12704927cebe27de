use crate::analysis::normalize::coerce_value;
use crate::config::Settings;
use crate::domain::security::SecurityMetrics;
use crate::ingest::provider::MarketDataClient;
use crate::ingest::types::Listing;
use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRIES: u32 = 3;
const SUMMARY_MODULES: &str = "price,summaryDetail,financialData,defaultKeyStatistics";
const RECENT_DIVIDENDS: usize = 4;
const TRADING_DAYS: f64 = 252.0;
const DAY_SECS: i64 = 86_400;

#[derive(Debug, Clone)]
pub struct YahooFinanceClient {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
}

impl YahooFinanceClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings
            .market_data_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout_secs = std::env::var("MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = std::env::var("MARKET_DATA_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_RETRIES)
            .max(1);

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (compatible; cartera/0.1)"),
        );

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers(headers)
            .build()
            .context("failed to build market data http client")?;

        Ok(Self {
            http,
            base_url,
            retries,
        })
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)]) -> Result<Value> {
        let res = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .context("market data request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read market data response")?;
        if !status.is_success() {
            anyhow::bail!("market data HTTP {status}: {}", truncate(&text, 300));
        }
        serde_json::from_str::<Value>(&text)
            .with_context(|| format!("market data response is not valid JSON: {}", truncate(&text, 300)))
    }

    async fn fetch_once(&self, listing: &Listing) -> Result<SecurityMetrics> {
        let base = self.base_url.trim_end_matches('/');
        let summary_url = format!("{base}/v10/finance/quoteSummary/{}", listing.ticker);
        let chart_url = format!("{base}/v8/finance/chart/{}", listing.ticker);

        let summary = self
            .get_json(&summary_url, &[("modules", SUMMARY_MODULES)])
            .await?;
        let chart = self
            .get_json(
                &chart_url,
                &[("range", "1y"), ("interval", "1d"), ("events", "div")],
            )
            .await?;

        parse_security(listing, &summary, &chart)
    }
}

const MAX_BACKOFF_SHIFT: u32 = 6;

/// Exponential wait after the `attempt`-th failure, capped at 64s.
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_secs(1u64 << attempt.saturating_sub(1).min(MAX_BACKOFF_SHIFT))
}

#[async_trait::async_trait]
impl MarketDataClient for YahooFinanceClient {
    fn provider_name(&self) -> &'static str {
        "yahoo_finance"
    }

    async fn fetch_security(&self, listing: &Listing) -> Result<SecurityMetrics> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(listing).await {
                Ok(item) => return Ok(item),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err.context(format!("giving up on {}", listing.ticker)));
                    }
                    let backoff = retry_backoff(attempt);
                    tracing::warn!(
                        attempt,
                        ticker = %listing.ticker,
                        ?backoff,
                        error = %err,
                        "market data fetch failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Builds metrics from a quoteSummary payload and a 1y daily chart with dividend events.
pub fn parse_security(listing: &Listing, summary: &Value, chart: &Value) -> Result<SecurityMetrics> {
    let result = summary
        .pointer("/quoteSummary/result/0")
        .with_context(|| format!("quoteSummary has no result for {}", listing.ticker))?;
    let field = |module: &str, key: &str| result.get(module).and_then(|m| m.get(key)).and_then(coerce_value);

    let chart_result = chart
        .pointer("/chart/result/0")
        .with_context(|| format!("chart has no result for {}", listing.ticker))?;
    let closes = daily_closes(chart_result);
    let dividends = recent_dividends(chart_result, RECENT_DIVIDENDS);

    let name = result
        .pointer("/price/shortName")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| listing.name.clone());

    let mut s = SecurityMetrics::new(&listing.ticker, name, &listing.sector);
    let previous_close = field("summaryDetail", "previousClose")
        .or_else(|| field("price", "regularMarketPreviousClose"));
    s.price = previous_close;
    s.profit_margin = field("financialData", "profitMargins");
    s.debt_to_equity = field("financialData", "debtToEquity");
    s.market_cap = field("summaryDetail", "marketCap").or_else(|| field("price", "marketCap"));
    s.recent_dividends = dividends.clone();

    let dividend_yield = field("summaryDetail", "dividendYield").filter(|y| *y != 0.0);
    let operating_cashflow = field("financialData", "operatingCashflow");
    let total_debt = field("financialData", "totalDebt");

    let f = &mut s.fundamentals;
    f.roe = field("financialData", "returnOnEquity");
    f.pe_ratio = field("summaryDetail", "trailingPE");
    f.revenue_growth = field("financialData", "revenueGrowth");
    f.earnings_growth = field("financialData", "earningsGrowth");
    f.beta = field("summaryDetail", "beta").or_else(|| field("defaultKeyStatistics", "beta"));
    f.cash_flow_to_debt = match (operating_cashflow, total_debt) {
        (Some(cf), Some(debt)) if debt != 0.0 => Some(cf / debt),
        _ => None,
    };
    f.dividend_yield = dividend_yield;
    f.dividend_per_share = match (dividend_yield, previous_close, dividends.last()) {
        (Some(_), Some(close), Some(last)) if close != 0.0 => Some(last / close),
        _ => None,
    };

    if let Some(last_ts) = closes.last().map(|(ts, _)| *ts) {
        f.change_1m = price_change(&window(&closes, last_ts - 30 * DAY_SECS));
        let six_months = window(&closes, last_ts - 182 * DAY_SECS);
        f.change_6m = price_change(&six_months);
        f.volatility = annualized_volatility(&six_months);
        s.change_1y = price_change(&closes.iter().map(|(_, c)| *c).collect::<Vec<_>>());
    }

    Ok(s)
}

/// `(timestamp, close)` pairs with null closes dropped.
fn daily_closes(chart_result: &Value) -> Vec<(i64, f64)> {
    let timestamps = chart_result
        .get("timestamp")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let closes = chart_result
        .pointer("/indicators/quote/0/close")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    timestamps
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| Some((ts.as_i64()?, coerce_value(close)?)))
        .collect()
}

fn recent_dividends(chart_result: &Value, keep: usize) -> Vec<f64> {
    let Some(events) = chart_result
        .pointer("/events/dividends")
        .and_then(Value::as_object)
    else {
        return Vec::new();
    };
    let mut dated: Vec<(i64, f64)> = events
        .values()
        .filter_map(|e| {
            let date = e.get("date").and_then(Value::as_i64)?;
            let amount = e.get("amount").and_then(coerce_value)?;
            Some((date, amount))
        })
        .collect();
    dated.sort_by_key(|(date, _)| *date);
    let skip = dated.len().saturating_sub(keep);
    dated.into_iter().skip(skip).map(|(_, a)| a).collect()
}

fn window(closes: &[(i64, f64)], since_ts: i64) -> Vec<f64> {
    closes
        .iter()
        .filter(|(ts, _)| *ts >= since_ts)
        .map(|(_, c)| *c)
        .collect()
}

/// Relative change from first to last close; needs two points and a non-zero start.
pub fn price_change(closes: &[f64]) -> Option<f64> {
    let (first, last) = (closes.first()?, closes.last()?);
    if closes.len() < 2 || *first == 0.0 {
        return None;
    }
    Some((last - first) / first)
}

/// Sample standard deviation of daily returns, annualized over 252 trading days.
pub fn annualized_volatility(closes: &[f64]) -> Option<f64> {
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    if returns.len() < 2 {
        return None;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt() * TRADING_DAYS.sqrt())
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing() -> Listing {
        Listing {
            ticker: "CCU.SN".into(),
            name: "CCU".into(),
            sector: "Embotellados".into(),
        }
    }

    fn chart() -> Value {
        let start = 1_735_700_000i64;
        let day = DAY_SECS;
        // 200 days of closes rising by 1 from 100, with one null gap.
        let timestamps: Vec<i64> = (0..200).map(|i| start + i * day).collect();
        let closes: Vec<Value> = (0..200)
            .map(|i| if i == 50 { Value::Null } else { json!(100.0 + i as f64) })
            .collect();
        json!({
            "chart": {
                "result": [{
                    "timestamp": timestamps,
                    "indicators": {"quote": [{"close": closes}]},
                    "events": {"dividends": {
                        "a": {"amount": 10.0, "date": start + 10 * day},
                        "b": {"amount": 12.0, "date": start + 100 * day},
                        "c": {"amount": 8.0, "date": start + 40 * day},
                        "d": {"amount": 9.0, "date": start + 70 * day},
                        "e": {"amount": 11.0, "date": start + 130 * day}
                    }}
                }],
                "error": null
            }
        })
    }

    #[test]
    fn parses_summary_and_chart() {
        let summary = json!({
            "quoteSummary": {
                "result": [{
                    "price": {"shortName": "Compania Cervecerias Unidas", "regularMarketPreviousClose": {"raw": 6100.0}},
                    "summaryDetail": {
                        "previousClose": {"raw": 6000.0, "fmt": "6,000.00"},
                        "dividendYield": {"raw": 0.045},
                        "trailingPE": {"raw": 14.2},
                        "beta": {"raw": 0.7},
                        "marketCap": {"raw": 2.2e12}
                    },
                    "financialData": {
                        "returnOnEquity": {"raw": 0.11},
                        "revenueGrowth": {"raw": 0.05},
                        "earningsGrowth": {},
                        "operatingCashflow": {"raw": 400.0},
                        "totalDebt": {"raw": 800.0},
                        "profitMargins": {"raw": 0.06},
                        "debtToEquity": {"raw": 75.0}
                    },
                    "defaultKeyStatistics": {}
                }],
                "error": null
            }
        });

        let s = parse_security(&listing(), &summary, &chart()).unwrap();
        assert_eq!(s.name, "Compania Cervecerias Unidas");
        assert_eq!(s.price, Some(6000.0));
        assert_eq!(s.fundamentals.roe, Some(0.11));
        assert_eq!(s.fundamentals.earnings_growth, None);
        assert_eq!(s.fundamentals.cash_flow_to_debt, Some(0.5));
        // Five events; the oldest (day 10) is dropped and the rest are date ordered.
        assert_eq!(s.recent_dividends, vec![8.0, 9.0, 12.0, 11.0]);
        assert_eq!(s.fundamentals.dividend_per_share, Some(11.0 / 6000.0));
        assert!(s.pays_dividends());

        // Last close 299 at day 199; 1M window starts at day 169 (close 269).
        let change_1m = s.fundamentals.change_1m.unwrap();
        assert!((change_1m - (299.0 - 269.0) / 269.0).abs() < 1e-12);
        let change_1y = s.change_1y.unwrap();
        assert!((change_1y - 199.0 / 100.0).abs() < 1e-12);
        assert!(s.fundamentals.volatility.unwrap() > 0.0);
    }

    #[test]
    fn missing_result_is_an_error() {
        let summary = json!({"quoteSummary": {"result": [], "error": {"code": "Not Found"}}});
        assert!(parse_security(&listing(), &summary, &chart()).is_err());
    }

    #[test]
    fn change_and_volatility_edge_cases() {
        assert_eq!(price_change(&[]), None);
        assert_eq!(price_change(&[5.0]), None);
        assert_eq!(price_change(&[0.0, 5.0]), None);
        assert_eq!(price_change(&[4.0, 5.0]), Some(0.25));
        assert_eq!(annualized_volatility(&[1.0, 2.0]), None);
        assert_eq!(annualized_volatility(&[1.0, 1.0, 1.0]), Some(0.0));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(retry_backoff(1), Duration::from_secs(1));
        assert_eq!(retry_backoff(3), Duration::from_secs(4));
        assert_eq!(retry_backoff(7), Duration::from_secs(64));
        assert_eq!(retry_backoff(100), Duration::from_secs(64));
        assert_eq!(retry_backoff(u32::MAX), Duration::from_secs(64));
    }
}
