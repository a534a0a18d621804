use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use std::fs;
use std::path::PathBuf;

pub fn studyplan_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".studyplan"))
}

pub fn ensure_studyplan_home() -> Result<PathBuf> {
    let dir = studyplan_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

pub fn default_memory_path() -> Result<PathBuf> {
    Ok(ensure_studyplan_home()?.join("memory.json"))
}

/// Current calendar date in the named IANA timezone.
pub fn today_in(timezone: &str) -> Result<NaiveDate> {
    let tz: Tz = timezone
        .parse()
        .map_err(|e| anyhow!("invalid timezone {timezone:?}: {e}"))?;
    Ok(Utc::now().with_timezone(&tz).date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn today_in_known_zone() {
        let d = today_in("America/Chicago").unwrap();
        let utc = Utc::now().date_naive();
        assert!((utc - d).num_days().abs() <= 1);
    }

    #[test]
    fn today_in_rejects_unknown_zone() {
        assert!(today_in("Mars/Olympus_Mons").is_err());
    }
}
