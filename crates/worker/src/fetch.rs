use cartera_core::config::{AnalysisConfig, Settings};
use cartera_core::domain::security::SecurityMetrics;
use cartera_core::ingest::provider::{fetch_universe, MarketDataClient};
use cartera_core::ingest::universe::chilean_universe;
use cartera_core::ingest::yahoo::YahooFinanceClient;
use cartera_core::storage::cache;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;

/// Fundamentals cached earlier today, or a fresh fetch of the Chilean universe.
///
/// "Today" is the local date of `stamp`. A fresh fetch is cached unless `persist` is false.
pub async fn load_or_fetch(
    settings: &Settings,
    config: &AnalysisConfig,
    as_of_date: NaiveDate,
    stamp: NaiveDateTime,
    refresh: bool,
    persist: bool,
) -> anyhow::Result<Vec<SecurityMetrics>> {
    let dir = config.data_dir.as_path();

    match cache::cache_info(dir, stamp.date()) {
        Ok(info) => tracing::info!(
            dir = %dir.display(),
            files = info.files,
            latest = ?info.latest,
            fresh = info.fresh,
            refresh,
            "fundamentals cache"
        ),
        Err(err) => tracing::warn!(dir = %dir.display(), error = %format!("{err:#}"), "cannot inspect fundamentals cache"),
    }

    if !refresh {
        if let Some(batch) = cache::load_today(dir, stamp.date()) {
            return Ok(batch);
        }
    }

    let client: Arc<dyn MarketDataClient> = Arc::new(YahooFinanceClient::from_settings(settings)?);
    let listings = chilean_universe();
    tracing::info!(
        %as_of_date,
        provider = client.provider_name(),
        listings = listings.len(),
        concurrency = config.fetch_concurrency,
        "fetching fundamentals"
    );

    let report = fetch_universe(client, listings, config.fetch_concurrency).await;
    if !report.failures.is_empty() {
        let failed: Vec<&str> = report.failures.iter().map(|f| f.ticker.as_str()).collect();
        tracing::warn!(count = failed.len(), tickers = ?failed, "some securities could not be fetched");
    }
    anyhow::ensure!(
        !report.items.is_empty(),
        "no market data fetched ({} of {} tickers failed)",
        report.failures.len(),
        report.attempted()
    );

    if persist {
        cache::save_fundamentals(dir, &report.items, stamp)?;
        cache::cleanup_old_files(dir, stamp.date(), config.cache_retention_days);
    }
    Ok(report.items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reuses_fundamentals_cached_earlier_today() {
        let dir = tempfile::tempdir().unwrap();
        let morning = NaiveDate::from_ymd_opt(2026, 3, 5)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        let batch = vec![SecurityMetrics::new("CCU.SN", "CCU", "Bebidas")];
        cache::save_fundamentals(dir.path(), &batch, morning).unwrap();

        let settings = Settings {
            openai_api_key: None,
            anthropic_api_key: None,
            sentry_dsn: None,
            market_data_base_url: None,
            data_dir: None,
        };
        let config = AnalysisConfig {
            data_dir: dir.path().to_path_buf(),
            ..AnalysisConfig::default()
        };
        let as_of = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        let afternoon = morning + chrono::Duration::hours(6);

        let loaded = load_or_fetch(&settings, &config, as_of, afternoon, false, false)
            .await
            .unwrap();
        assert_eq!(loaded, batch);
    }
}
