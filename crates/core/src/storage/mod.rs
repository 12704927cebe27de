pub mod cache;
pub mod recommendations;

use anyhow::Context;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `<kind>_<YYYYMMDD>_<HHMMSS>.<ext>`
pub fn stamped_file_name(kind: &str, ext: &str, at: NaiveDateTime) -> String {
    format!("{kind}_{}.{ext}", at.format(STAMP_FORMAT))
}

/// Inverse of [`stamped_file_name`]; `None` for names of another kind or with a bad stamp.
pub fn parse_stamp(file_name: &str, kind: &str, ext: &str) -> Option<NaiveDateTime> {
    let stamp = file_name
        .strip_prefix(kind)?
        .strip_prefix('_')?
        .strip_suffix(ext)?
        .strip_suffix('.')?;
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()
}

/// Stamped files of one kind in `dir`, newest first. A missing directory is empty.
pub fn list_stamped(dir: &Path, kind: &str, ext: &str) -> anyhow::Result<Vec<(NaiveDateTime, PathBuf)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))?;

    let mut out = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(at) = parse_stamp(name, kind, ext) {
            out.push((at, path));
        }
    }
    out.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
    Ok(out)
}

pub(crate) fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, d)
            .unwrap()
            .and_hms_opt(h, 5, 9)
            .unwrap()
    }

    #[test]
    fn stamp_round_trips_through_file_name() {
        let name = stamped_file_name("fundamental_data", "csv", at(2, 9));
        assert_eq!(name, "fundamental_data_20260302_090509.csv");
        assert_eq!(parse_stamp(&name, "fundamental_data", "csv"), Some(at(2, 9)));
        assert_eq!(parse_stamp(&name, "portfolio_weights", "csv"), None);
        assert_eq!(parse_stamp("fundamental_data_2026_x.csv", "fundamental_data", "csv"), None);
    }

    #[test]
    fn lists_newest_first_and_ignores_strangers() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            stamped_file_name("recommendation", "json", at(1, 10)),
            stamped_file_name("recommendation", "json", at(3, 8)),
            stamped_file_name("recommendation", "csv", at(4, 8)),
            "notes.txt".to_string(),
        ] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }

        let listed = list_stamped(dir.path(), "recommendation", "json").unwrap();
        let stamps: Vec<NaiveDateTime> = listed.iter().map(|(at, _)| *at).collect();
        assert_eq!(stamps, vec![at(3, 8), at(1, 10)]);

        let missing = dir.path().join("nope");
        assert!(list_stamped(&missing, "recommendation", "json").unwrap().is_empty());
    }
}
