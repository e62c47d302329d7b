use crate::reconcile::identifiers::ClearedIdentifierPolicy;
use crate::report::format::{FormatOverride, FormatProfile, ReportFormat};
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: String,
    /// Rows per transaction when loading the catalog.
    pub chunk_size: usize,
    pub default_format: ReportFormat,
    pub cleared_identifier_policy: ClearedIdentifierPolicy,
    /// Write `<stem>_resolved.<ext>` next to the source after a resolution.
    pub export_resolved: bool,
    /// Per-format overrides keyed by format name, e.g. `[formats.inventory]`.
    pub formats: BTreeMap<String, FormatOverride>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: "listing_recon.db".to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            default_format: ReportFormat::default(),
            cleared_identifier_policy: ClearedIdentifierPolicy::default(),
            export_resolved: false,
            formats: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn profile_for(&self, format: ReportFormat) -> FormatProfile {
        let profile = FormatProfile::for_format(format);
        match self.formats.get(format.as_str()) {
            Some(o) => profile.with_override(o),
            None => profile,
        }
    }
}

/// `Config.toml` in the working directory (optional), then `RECON_*`
/// environment variables on top.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("RECON").try_parsing(true))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
