use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use eewpw_parser::ParserConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_CONFIG_FILE: &str = "eewpw.toml";
const CONFIG_FILE_ENV: &str = "EEWPW_CONFIG_FILE";

/// Process-level settings that never reach the parser core.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
struct ProcessSection {
    profile_dir: PathBuf,
    retention_days: u32,
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            profile_dir: PathBuf::from("configs/profiles"),
            retention_days: 2,
        }
    }
}

/// Everything the binary needs: the resolved parser configuration plus the
/// few keys only the process uses.
#[derive(Debug, Clone)]
pub struct Settings {
    pub parser: ParserConfig,
    pub profile_dir: PathBuf,
    pub retention_days: u32,
}

impl Settings {
    /// Load from defaults, then the TOML file, then `EEWPW_*` variables.
    ///
    /// An explicit `path` (or `$EEWPW_CONFIG_FILE`) must exist; the default
    /// `eewpw.toml` is optional. Nested keys use a double underscore:
    /// `EEWPW_LIVE__DATA_ROOT=/srv/eewpw`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_FILE_ENV).map(PathBuf::from));
        let (file, required) = match explicit {
            Some(p) => (p, true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        Self::load_from(&file, required, Some("EEWPW"))
    }

    fn load_from(file: &Path, required: bool, env_prefix: Option<&str>) -> Result<Self> {
        // Start with compile-time defaults so missing keys keep their value
        let parser_defaults = config::Config::try_from(&ParserConfig::default())
            .context("Failed to serialize default parser configuration")?;
        let process_defaults = config::Config::try_from(&ProcessSection::default())
            .context("Failed to serialize default process configuration")?;

        let mut builder = config::Config::builder()
            .add_source(parser_defaults)
            .add_source(process_defaults)
            .add_source(config::File::from(file).format(config::FileFormat::Toml).required(required));

        if let Some(prefix) = env_prefix {
            builder = builder.add_source(
                config::Environment::with_prefix(prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let built = builder
            .build()
            .with_context(|| format!("Failed to build configuration from {}", file.display()))?;
        let parser: ParserConfig = built
            .clone()
            .try_deserialize()
            .context("Failed to deserialize parser configuration")?;
        let process: ProcessSection = built
            .try_deserialize()
            .context("Failed to deserialize process configuration")?;

        Ok(Self {
            parser,
            profile_dir: process.profile_dir,
            retention_days: process.retention_days,
        })
    }
}
