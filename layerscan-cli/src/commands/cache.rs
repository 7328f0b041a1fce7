//! `layerscan cache` command handler

use std::io::Write;

use serde::Serialize;
use tracing::info;

use layerscan_core::config::{CacheBackend, LayerscanConfig};
use layerscan_inspector::{InspectorError, cache};

use crate::cli::{CacheAction, CacheArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `cache` command.
pub async fn execute(
    args: CacheArgs,
    mut config: LayerscanConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        CacheAction::Clean { cache: options } => {
            options.apply(&mut config);
            config.validate()?;

            let backend = cache::from_config(&config.cache).await?;
            backend.clear().await.map_err(InspectorError::from)?;

            let report = CacheCleanReport::new(&config);
            info!(backend = %report.backend, location = %report.location, "cache cleared");
            writer.render(&report)
        }
    }
}

/// Result of `cache clean`.
#[derive(Debug, Serialize)]
pub struct CacheCleanReport {
    pub backend: String,
    pub location: String,
    pub cleared: bool,
}

impl CacheCleanReport {
    fn new(config: &LayerscanConfig) -> Self {
        let location = match config.cache.backend_kind() {
            Some(CacheBackend::Fs) => config.cache.dir.clone(),
            Some(CacheBackend::Remote) => config.cache.remote_url.clone(),
            Some(CacheBackend::Memory) | None => "(in-process)".to_owned(),
        };
        Self {
            backend: config.cache.backend.clone(),
            location,
            cleared: true,
        }
    }
}

impl Render for CacheCleanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{} {} cache cleared ({})",
            "✓".green(),
            self.backend,
            self.location
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{CacheOptions, OutputFormat};

    #[tokio::test]
    async fn test_clean_removes_fs_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache_dir = dir.path().join("cache");
        std::fs::create_dir_all(cache_dir.join("blob")).expect("mkdir");
        std::fs::write(cache_dir.join("blob/sha256-abc.json"), "{}").expect("write");

        let args = CacheArgs {
            action: CacheAction::Clean {
                cache: CacheOptions {
                    cache_backend: Some("fs".to_owned()),
                    cache_dir: Some(cache_dir.display().to_string()),
                },
            },
        };
        execute(args, LayerscanConfig::default(), &OutputWriter::new(OutputFormat::Json))
            .await
            .expect("clean");

        assert!(cache_dir.join("blob").is_dir());
        assert!(!cache_dir.join("blob/sha256-abc.json").exists());
    }

    #[test]
    fn test_report_location_by_backend() {
        let mut config = LayerscanConfig::default();
        config.cache.backend = "memory".to_owned();
        assert_eq!(CacheCleanReport::new(&config).location, "(in-process)");

        config.cache.backend = "fs".to_owned();
        config.cache.dir = "/var/cache/layerscan".to_owned();
        let report = CacheCleanReport::new(&config);
        assert_eq!(report.location, "/var/cache/layerscan");

        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("fs cache cleared"));
    }
}
