//! `layerscan analyzers` command handler

use std::io::Write;

use serde::Serialize;

use layerscan_core::config::LayerscanConfig;
use layerscan_inspector::{AnalyzerRegistry, InspectorConfig};

use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `analyzers` command.
///
/// Lists the built-in analyzers with their versions and whether the
/// effective configuration disables them.
pub fn execute(config: &LayerscanConfig, writer: &OutputWriter) -> Result<(), CliError> {
    let inspector_config = InspectorConfig::from_core(&config.scan)?;
    let report = AnalyzerReport::new(&AnalyzerRegistry::builtin(), &inspector_config);
    writer.render(&report)
}

#[derive(Debug, Serialize)]
pub struct AnalyzerReport {
    pub analyzers: Vec<AnalyzerRow>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzerRow {
    pub name: String,
    pub version: u32,
    pub enabled: bool,
}

impl AnalyzerReport {
    fn new(registry: &AnalyzerRegistry, config: &InspectorConfig) -> Self {
        let mut analyzers: Vec<AnalyzerRow> = registry
            .analyzers()
            .iter()
            .map(|a| AnalyzerRow {
                name: a.analyzer_type().to_string(),
                version: a.version(),
                enabled: !config.disabled_analyzers.contains(&a.analyzer_type()),
            })
            .collect();
        analyzers.sort_by(|a, b| a.name.cmp(&b.name));
        Self { analyzers }
    }
}

impl Render for AnalyzerReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "{:<16} {:<8} {:<8}", "Analyzer", "Version", "Status")?;
        writeln!(w, "{}", "-".repeat(34))?;
        for row in &self.analyzers {
            let status = if row.enabled {
                "enabled".green()
            } else {
                "disabled".dimmed()
            };
            writeln!(w, "{:<16} {:<8} {}", row.name, row.version, status)?;
        }
        Ok(())
    }
}
