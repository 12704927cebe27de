use crate::domain::security::SecurityMetrics;
use crate::ingest::types::{FetchFailure, FetchReport, Listing};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_security(&self, listing: &Listing) -> Result<SecurityMetrics>;
}

/// Fetches every listing with at most `concurrency` requests in flight.
///
/// Per-security failures are recorded in the report and never abort the batch.
/// Items come back in `listings` order.
pub async fn fetch_universe(
    client: Arc<dyn MarketDataClient>,
    listings: Vec<Listing>,
    concurrency: usize,
) -> FetchReport {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let total = listings.len();
    let mut tasks = JoinSet::new();

    for (idx, listing) in listings.into_iter().enumerate() {
        let client = Arc::clone(&client);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => client.fetch_security(&listing).await,
                Err(err) => Err(anyhow::Error::new(err)),
            };
            (idx, listing, result)
        });
    }

    let mut fetched: Vec<(usize, SecurityMetrics)> = Vec::with_capacity(total);
    let mut failures = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((idx, _, Ok(item))) => fetched.push((idx, item)),
            Ok((_, listing, Err(err))) => {
                tracing::warn!(
                    ticker = %listing.ticker,
                    provider = client.provider_name(),
                    error = %err,
                    "market data fetch failed; skipping security"
                );
                failures.push(FetchFailure {
                    ticker: listing.ticker,
                    error: format!("{err:#}"),
                });
            }
            Err(err) => {
                tracing::error!(error = %err, "market data fetch task aborted");
            }
        }
    }

    fetched.sort_by_key(|(idx, _)| *idx);
    failures.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    tracing::info!(
        total,
        fetched = fetched.len(),
        failed = failures.len(),
        "market data fetch complete"
    );

    FetchReport {
        items: fetched.into_iter().map(|(_, item)| item).collect(),
        failures,
    }
}
