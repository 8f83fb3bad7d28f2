use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use eewpw_parser::annotate::AnnotationProfile;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
struct ProfileFile {
    #[serde(default)]
    patterns: BTreeMap<String, String>,
}

pub fn profile_path(dir: &Path, algo: &str, profile: &str) -> PathBuf {
    dir.join(format!("{algo}_{profile}.json"))
}

/// Load `<dir>/<algo>_<profile>.json`.
///
/// A missing or unreadable document yields an empty profile; a pattern that
/// does not compile is an error.
pub fn load_profile(dir: &Path, algo: &str, profile: &str) -> Result<AnnotationProfile> {
    let path = profile_path(dir, algo, profile);
    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No annotation profile found; annotations disabled");
            return Ok(AnnotationProfile::empty(profile));
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to read profile {}", path.display())),
    };

    let doc: ProfileFile = match serde_json::from_str(&raw) {
        Ok(doc) => doc,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Malformed annotation profile; annotations disabled");
            ProfileFile::default()
        }
    };

    let compiled = AnnotationProfile::from_patterns(profile, &doc.patterns)
        .with_context(|| format!("Invalid annotation profile {}", path.display()))?;
    info!(path = %path.display(), rules = compiled.rules().len(), "Annotation profile loaded");
    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_loads_patterns() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            profile_path(dir.path(), "finder", "time_vs_magnitude"),
            r#"{"patterns": {"mag": "FinDer magnitude", "ts": "^\\d{4}"}}"#,
        )
        .unwrap();
        let p = load_profile(dir.path(), "finder", "time_vs_magnitude").unwrap();
        assert_eq!(p.name(), "time_vs_magnitude");
        assert_eq!(p.rules().len(), 2);
    }

    #[test]
    fn test_missing_file_is_empty_profile() {
        let dir = TempDir::new().unwrap();
        let p = load_profile(dir.path(), "vs", "time_vs_magnitude").unwrap();
        assert!(p.is_empty());
        assert_eq!(p.name(), "time_vs_magnitude");
    }

    #[test]
    fn test_malformed_json_is_empty_profile() {
        let dir = TempDir::new().unwrap();
        std::fs::write(profile_path(dir.path(), "vs", "x"), "{not json").unwrap();
        assert!(load_profile(dir.path(), "vs", "x").unwrap().is_empty());
    }

    #[test]
    fn test_bad_regex_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(profile_path(dir.path(), "vs", "x"), r#"{"patterns": {"broken": "(unclosed"}}"#).unwrap();
        assert!(load_profile(dir.path(), "vs", "x").is_err());
    }
}
