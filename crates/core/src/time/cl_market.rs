use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use std::collections::HashSet;

// Santiago standard time. DST shifts the close by an hour, which the cutoff absorbs.
const CLT_OFFSET_SECS: i32 = -4 * 3600;

// Bolsa de Santiago closes at 16:00 local; fundamentals settle shortly after.
const CLOSE_CUTOFF_HOUR_CLT: u32 = 17;
const CLOSE_CUTOFF_MINUTE_CLT: u32 = 0;

/// Market date a run should use. Before the cutoff the previous business day is used.
pub fn resolve_as_of_date(
    as_of_date_arg: Option<&str>,
    now_utc: DateTime<Utc>,
) -> anyhow::Result<NaiveDate> {
    if let Some(s) = as_of_date_arg {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --as-of-date {s:?}; expected YYYY-MM-DD"));
    }

    let clt = chrono::FixedOffset::east_opt(CLT_OFFSET_SECS).context("invalid CLT offset")?;
    let now_clt = now_utc.with_timezone(&clt);

    let cutoff_reached =
        (now_clt.hour(), now_clt.minute()) >= (CLOSE_CUTOFF_HOUR_CLT, CLOSE_CUTOFF_MINUTE_CLT);
    let mut date = now_clt.date_naive();
    if !cutoff_reached {
        date = date - Duration::days(1);
    }

    let holidays = configured_holidays();
    while !is_business_day_in(date, &holidays) {
        date = date - Duration::days(1);
    }

    Ok(date)
}

/// Wall-clock Santiago time, used to stamp output files.
pub fn local_now(now_utc: DateTime<Utc>) -> anyhow::Result<chrono::NaiveDateTime> {
    let clt = chrono::FixedOffset::east_opt(CLT_OFFSET_SECS).context("invalid CLT offset")?;
    Ok(now_utc.with_timezone(&clt).naive_local())
}

pub fn first_business_day(year: i32, month: u32) -> anyhow::Result<NaiveDate> {
    first_business_day_in(year, month, &configured_holidays())
}

pub fn is_first_business_day(date: NaiveDate) -> bool {
    let holidays = configured_holidays();
    first_business_day_in(date.year(), date.month(), &holidays)
        .map(|first| first == date)
        .unwrap_or(false)
}

fn first_business_day_in(
    year: i32,
    month: u32,
    holidays: &HashSet<NaiveDate>,
) -> anyhow::Result<NaiveDate> {
    let mut date = NaiveDate::from_ymd_opt(year, month, 1)
        .with_context(|| format!("invalid year/month {year}-{month}"))?;
    while !is_business_day_in(date, holidays) {
        date = date + Duration::days(1);
    }
    Ok(date)
}

fn is_business_day_in(date: NaiveDate, holidays: &HashSet<NaiveDate>) -> bool {
    !is_weekend(date) && !holidays.contains(&date)
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn configured_holidays() -> HashSet<NaiveDate> {
    // Fixed-date national holidays only.
    // Extend via CL_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD".
    let mut out = HashSet::new();
    for y in 2024..=2030 {
        for (m, d) in [(1, 1), (5, 1), (5, 21), (9, 18), (9, 19), (12, 25)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.insert(date);
            }
        }
    }

    if let Ok(s) = std::env::var("CL_MARKET_HOLIDAYS") {
        out.extend(parse_holiday_list(&s));
    }

    out
}

fn parse_holiday_list(s: &str) -> Vec<NaiveDate> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| NaiveDate::parse_from_str(part, "%Y-%m-%d").ok())
        .collect()
}
