use anyhow::Context;
use cartera_core::analysis::allocate::AllocationError;
use cartera_core::analysis::{is_degraded, report, run_analysis};
use cartera_core::config::{AnalysisConfig, Settings};
use cartera_core::domain::profile::RiskLevel;
use cartera_core::storage::recommendations;
use cartera_core::time::cl_market;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod fetch;

#[derive(Debug, Parser)]
#[command(name = "cartera_worker")]
struct Args {
    /// Market as-of date (YYYY-MM-DD). Defaults to the latest closed Santiago session.
    #[arg(long)]
    as_of_date: Option<String>,

    /// Total budget in CLP; must be a multiple of 1,000.
    #[arg(long)]
    budget: Option<i64>,

    /// conservative|moderate|aggressive (Spanish names accepted).
    #[arg(long)]
    risk_level: Option<String>,

    #[arg(long)]
    dividend_preference: Option<bool>,

    /// Minimum number of positions (never fewer than 5).
    #[arg(long)]
    top_stocks: Option<usize>,

    #[arg(long)]
    min_investment: Option<i64>,

    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Ignore today's cached fundamentals and fetch again.
    #[arg(long)]
    refresh: bool,

    /// Skip the LLM and use the computed analysis and distribution.
    #[arg(long)]
    no_llm: bool,

    /// Scheduled monthly run: only proceeds on the first business day and writes the text report.
    #[arg(long)]
    monthly: bool,

    /// With --monthly, run even when it is not the first business day.
    #[arg(long)]
    force: bool,

    /// Do everything except writing files.
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn apply(&self, mut config: AnalysisConfig) -> anyhow::Result<AnalysisConfig> {
        if let Some(budget) = self.budget {
            config.budget = budget;
        }
        if let Some(risk) = self.risk_level.as_deref() {
            config.risk_level = risk.parse::<RiskLevel>()?;
        }
        if let Some(pref) = self.dividend_preference {
            config.dividend_preference = pref;
        }
        if let Some(n) = self.top_stocks {
            config.top_stocks_count = n;
        }
        if let Some(min) = self.min_investment {
            config.min_investment = min;
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    if let Err(err) = run(&settings, args).await {
        sentry_anyhow::capture_anyhow(&err);
        if let Some(alloc) = err.downcast_ref::<AllocationError>() {
            tracing::error!(error = %alloc, "allocation failed; nothing persisted");
        } else {
            tracing::error!(error = %format!("{err:#}"), "analysis run failed");
        }
        return Err(err);
    }
    Ok(())
}

async fn run(settings: &Settings, args: Args) -> anyhow::Result<()> {
    let config = args.apply(AnalysisConfig::from_env())?;

    let now = Utc::now();
    let as_of_date = cl_market::resolve_as_of_date(args.as_of_date.as_deref(), now)?;
    let stamp = cl_market::local_now(now)?;

    if args.monthly && !args.force && !monthly_run_due(now)? {
        tracing::info!(today = %stamp.date(), %as_of_date, "not the first business day of the month; skipping monthly run");
        return Ok(());
    }

    tracing::info!(
        %as_of_date,
        budget = config.budget,
        risk_level = %config.risk_level,
        dividend_preference = config.dividend_preference,
        top_stocks = config.top_stocks_count,
        data_dir = %config.data_dir.display(),
        "starting analysis run"
    );

    let batch = fetch::load_or_fetch(
        settings,
        &config,
        as_of_date,
        stamp,
        args.refresh,
        !args.dry_run,
    )
    .await?;

    let advisor = if args.no_llm {
        None
    } else {
        cartera_core::llm::client_from_settings(settings)?
    };
    if let Some(advisor) = advisor.as_deref() {
        tracing::info!(provider = advisor.provider().as_str(), "using LLM advisor");
    } else {
        tracing::info!("no LLM advisor; using computed analysis");
    }

    let run = run_analysis(&batch, &config, advisor.as_deref(), as_of_date, now).await?;
    if is_degraded(&run.recommendation) {
        tracing::warn!(mode = ?run.recommendation.scoring_mode, "scoring fell back to equal weights");
    }
    tracing::info!(
        run_id = %run.recommendation.run_id,
        positions = run.recommendation.items.len(),
        total_invested = run.recommendation.total_invested,
        distribution = ?run.distribution.source,
        "analysis complete"
    );

    let report_text = args
        .monthly
        .then(|| report::render_monthly_report(&run, stamp));

    if args.dry_run {
        tracing::info!(%as_of_date, dry_run = true, "skipping writes");
        println!("{}", report_text.as_deref().unwrap_or(&run.distribution.text));
        return Ok(());
    }

    let files = recommendations::persist_run(&config.data_dir, &run, stamp)?;
    tracing::info!(snapshot = %files.snapshot.display(), "snapshot written");

    if let Some(text) = report_text {
        let path = config.data_dir.join(report::report_file_name(as_of_date));
        std::fs::write(&path, text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "monthly report written");
    } else {
        println!("{}", run.distribution.text);
    }

    Ok(())
}

/// The monthly run is due on the first business day by Santiago's calendar,
/// whatever session the as-of date rolls back to.
fn monthly_run_due(now: DateTime<Utc>) -> anyhow::Result<bool> {
    let today = cl_market::local_now(now)?.date();
    Ok(cl_market::is_first_business_day(today))
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let args = Args::parse_from([
            "cartera_worker",
            "--budget",
            "1000000",
            "--risk-level",
            "agresivo",
            "--dividend-preference",
            "false",
            "--top-stocks",
            "7",
            "--monthly",
        ]);
        let config = args.apply(AnalysisConfig::default()).unwrap();
        assert_eq!(config.budget, 1_000_000);
        assert_eq!(config.risk_level, RiskLevel::Aggressive);
        assert!(!config.dividend_preference);
        assert_eq!(config.top_stocks_count, 7);
        assert_eq!(config.min_investment, 20_000);
        assert!(args.monthly && !args.force);
    }

    #[test]
    fn monthly_gate_follows_local_calendar_day() {
        use chrono::TimeZone;
        // 10:00 in Santiago on Monday 2026-03-02: the as-of date is still Friday's session.
        let first = Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap();
        assert_eq!(
            cl_market::resolve_as_of_date(None, first).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2026, 2, 27).unwrap()
        );
        assert!(monthly_run_due(first).unwrap());

        let second = Utc.with_ymd_and_hms(2026, 3, 3, 14, 0, 0).unwrap();
        assert!(!monthly_run_due(second).unwrap());

        // 23:30 CLT on 2026-03-01 is already the 2nd in UTC.
        let sunday_night = Utc.with_ymd_and_hms(2026, 3, 2, 3, 30, 0).unwrap();
        assert!(!monthly_run_due(sunday_night).unwrap());
    }

    #[test]
    fn bad_risk_level_is_rejected() {
        let args = Args::parse_from(["cartera_worker", "--risk-level", "yolo"]);
        assert!(args.apply(AnalysisConfig::default()).is_err());
    }
}
