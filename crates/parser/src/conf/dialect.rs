use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algo {
    Finder,
    Vs,
}

impl Algo {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algo::Finder => "finder",
            Algo::Vs => "vs",
        }
    }

    pub fn default_dialect(&self) -> DialectKind {
        match self {
            Algo::Finder => DialectKind::ScFinder,
            Algo::Vs => DialectKind::ScVsMag,
        }
    }
}

impl fmt::Display for Algo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algo {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "finder" => Ok(Algo::Finder),
            "vs" => Ok(Algo::Vs),
            other => Err(ConfigError::UnknownAlgo(other.to_string())),
        }
    }
}

/// Closed set of supported log dialects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialectKind {
    /// SeisComP scfinder module logs.
    ScFinder,
    /// ShakeAlert logs carrying `<event_message>` XML payloads.
    ShakeAlert,
    /// Finder standalone logs with wall-clock prefixes.
    NativeFinder,
    /// Older Finder standalone logs, epoch-stamped only.
    NativeFinderLegacy,
    /// SeisComP scvsmag module logs.
    ScVsMag,
}

impl DialectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::ScFinder => "scfinder",
            DialectKind::ShakeAlert => "shakealert",
            DialectKind::NativeFinder => "native_finder",
            DialectKind::NativeFinderLegacy => "native_finder_legacy",
            DialectKind::ScVsMag => "scvsmag",
        }
    }

    pub fn algo(&self) -> Algo {
        match self {
            DialectKind::ScVsMag => Algo::Vs,
            _ => Algo::Finder,
        }
    }

    fn from_alias(alias: &str) -> Option<Self> {
        let kind = match alias {
            "scfinder" => DialectKind::ScFinder,
            "shakealert" => DialectKind::ShakeAlert,
            "native_finder" | "native-finder" | "nativefinder" | "finder" => {
                DialectKind::NativeFinder
            }
            "native_finder_legacy" | "native-finder-legacy" | "nativefinderlegacy"
            | "finder_legacy" | "finder-legacy" | "finderlegacy" => DialectKind::NativeFinderLegacy,
            "scvsmag" | "scvs" | "vs" => DialectKind::ScVsMag,
            _ => return None,
        };
        Some(kind)
    }

    /// Resolve a user-supplied dialect name for `algo`. `None` selects the
    /// algorithm's default dialect.
    pub fn resolve(algo: Algo, name: Option<&str>) -> Result<Self, ConfigError> {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok(algo.default_dialect());
        };
        let kind = Self::from_alias(&name.to_ascii_lowercase()).ok_or_else(|| {
            ConfigError::UnknownDialect {
                algo,
                dialect: name.to_string(),
            }
        })?;
        if kind.algo() != algo {
            return Err(ConfigError::DialectMismatch { algo, dialect: kind });
        }
        Ok(kind)
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
