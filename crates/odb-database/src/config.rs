use std::path::Path;
use std::time::Duration;

use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{DbError, DbResult};

/// Tunables for a [`Database`](crate::Database).
///
/// ```toml
/// compression_level = 6
/// verify_pack_crc = true
/// pack_idle_timeout_secs = 2
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// zlib level (0-9) for new loose objects.
    pub compression_level: u32,
    /// Check each packed entry against its index CRC32 before inflating.
    pub verify_pack_crc: bool,
    /// Packs idle this long are closed by `Database::evict_idle_packs`.
    pub pack_idle_timeout_secs: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            compression_level: 9,
            verify_pack_crc: false,
            pack_idle_timeout_secs: None,
        }
    }
}

impl DatabaseConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> DbResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| DbError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn from_file(path: &Path) -> DbResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DbError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> DbResult<()> {
        if self.compression_level > 9 {
            return Err(DbError::Config(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }

    pub fn compression(&self) -> Compression {
        Compression::new(self.compression_level)
    }

    pub fn pack_idle_timeout(&self) -> Option<Duration> {
        self.pack_idle_timeout_secs.map(Duration::from_secs)
    }
}
