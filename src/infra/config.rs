use crate::infra::error::{LsmError, Result};
use std::path::PathBuf;

/// Engine-facing configuration: where data lives and when the memtable
/// spills to a new SSTable. Deliberately small — no bloom filter, no
/// block cache, no compression knobs, since this engine carries none of
/// those.
#[derive(Debug, Clone)]
pub struct LsmConfig {
    pub dir_path: PathBuf,
    pub memtable_flush_threshold_bytes: usize,
}

const DEFAULT_FLUSH_THRESHOLD_BYTES: usize = 32 * 1024 * 1024;

impl Default for LsmConfig {
    fn default() -> Self {
        Self {
            dir_path: PathBuf::from("./.ring-data"),
            memtable_flush_threshold_bytes: DEFAULT_FLUSH_THRESHOLD_BYTES,
        }
    }
}

impl LsmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> LsmConfigBuilder {
        LsmConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.memtable_flush_threshold_bytes == 0 {
            return Err(LsmError::InvalidMemtableSize(
                "flush threshold cannot be 0".to_string(),
            ));
        }
        if self.memtable_flush_threshold_bytes < 1024 {
            return Err(LsmError::InvalidMemtableSize(
                "flush threshold too small (minimum 1KB)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn from_env() -> Self {
        let defaults = Self::default();
        let dir_path = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.dir_path);
        let memtable_flush_threshold_bytes = std::env::var("MEMTABLE_FLUSH_THRESHOLD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.memtable_flush_threshold_bytes);
        Self {
            dir_path,
            memtable_flush_threshold_bytes,
        }
    }
}

#[derive(Default)]
pub struct LsmConfigBuilder {
    dir_path: Option<PathBuf>,
    memtable_flush_threshold_bytes: Option<usize>,
}

impl LsmConfigBuilder {
    pub fn dir_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.dir_path = Some(path.into());
        self
    }

    pub fn memtable_flush_threshold_bytes(mut self, bytes: usize) -> Self {
        self.memtable_flush_threshold_bytes = Some(bytes);
        self
    }

    pub fn build(self) -> Result<LsmConfig> {
        let defaults = LsmConfig::default();
        let config = LsmConfig {
            dir_path: self.dir_path.unwrap_or(defaults.dir_path),
            memtable_flush_threshold_bytes: self
                .memtable_flush_threshold_bytes
                .unwrap_or(defaults.memtable_flush_threshold_bytes),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(LsmConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let result = LsmConfig::builder().memtable_flush_threshold_bytes(0).build();
        assert!(matches!(result, Err(LsmError::InvalidMemtableSize(_))));
    }

    #[test]
    fn builder_overrides_defaults() {
        let config = LsmConfig::builder()
            .dir_path("/tmp/somewhere")
            .memtable_flush_threshold_bytes(4096)
            .build()
            .unwrap();
        assert_eq!(config.dir_path, PathBuf::from("/tmp/somewhere"));
        assert_eq!(config.memtable_flush_threshold_bytes, 4096);
    }
}
