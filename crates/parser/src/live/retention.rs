use std::path::{Path, PathBuf};

use chrono::{Days, NaiveDate};
use tracing::{debug, info};

/// Delete `<data_root>/live/raw/*/<YYYY-MM-DD>_*.jsonl` files older than
/// `retention_days` (counting `today`, minimum 1). Files whose name does not
/// start with a date are left alone. Returns the removed paths.
pub fn sweep_daily_files(
    data_root: &Path,
    retention_days: u32,
    today: NaiveDate,
) -> std::io::Result<Vec<PathBuf>> {
    let keep = u64::from(retention_days.max(1)) - 1;
    let cutoff = today.checked_sub_days(Days::new(keep)).unwrap_or(NaiveDate::MIN);
    let root = data_root.join("live").join("raw");
    let mut removed = Vec::new();
    if !root.is_dir() {
        return Ok(removed);
    }

    for algo_dir in std::fs::read_dir(&root)? {
        let algo_dir = algo_dir?.path();
        if !algo_dir.is_dir() {
            continue;
        }
        for entry in std::fs::read_dir(&algo_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(date) = file_date(&path) else { continue };
            if date >= cutoff {
                continue;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed expired daily file");
                    removed.push(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    info!(removed = removed.len(), %cutoff, "Retention sweep finished");
    Ok(removed)
}

fn file_date(path: &Path) -> Option<NaiveDate> {
    let stem = path.file_stem()?.to_str()?;
    let date = stem.split('_').next()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_sweep_keeps_window_inclusive_of_today() {
        let dir = TempDir::new().unwrap();
        let finder = dir.path().join("live/raw/finder");
        std::fs::create_dir_all(&finder).unwrap();
        for name in [
            "2025-03-08_finder.jsonl",
            "2025-03-09_finder.jsonl",
            "2025-03-10_finder.jsonl",
            "notes_finder.jsonl",
            "2025-01-01_finder.txt",
        ] {
            std::fs::write(finder.join(name), "{}\n").unwrap();
        }

        let removed = sweep_daily_files(dir.path(), 2, day("2025-03-10")).unwrap();
        assert_eq!(removed, vec![finder.join("2025-03-08_finder.jsonl")]);
        assert!(finder.join("2025-03-09_finder.jsonl").exists());
        assert!(finder.join("notes_finder.jsonl").exists());
        assert!(finder.join("2025-01-01_finder.txt").exists());
    }

    #[test]
    fn test_zero_retention_keeps_today() {
        let dir = TempDir::new().unwrap();
        let vs = dir.path().join("live/raw/vs");
        std::fs::create_dir_all(&vs).unwrap();
        std::fs::write(vs.join("2025-03-10_vs.jsonl"), "{}\n").unwrap();
        std::fs::write(vs.join("2025-03-09_vs.jsonl"), "{}\n").unwrap();

        let removed = sweep_daily_files(dir.path(), 0, day("2025-03-10")).unwrap();
        assert_eq!(removed.len(), 1);
        assert!(vs.join("2025-03-10_vs.jsonl").exists());
    }

    #[test]
    fn test_missing_root_is_noop() {
        let dir = TempDir::new().unwrap();
        assert!(sweep_daily_files(dir.path(), 2, day("2025-03-10")).unwrap().is_empty());
    }
}
