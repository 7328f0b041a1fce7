//! `layerscan fs|repo|image|sbom` command handler

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use layerscan_core::config::LayerscanConfig;
use layerscan_core::types::{ArtifactReference, Package};
use layerscan_inspector::cache;
use layerscan_inspector::{
    Applier, AnalyzerRegistry, ApplyOutcome, ImageSource, Inspector, InspectorConfig,
    LocalSource, SbomSource,
};

use crate::cli::ScanArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Artifact kind selected by the subcommand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Filesystem,
    Repository,
    Image,
    Sbom,
}

/// Execute an inspection subcommand.
///
/// Inspects the target, fills the cache, merges the cached layers and renders
/// the merged view. Soft warnings (unknown OS, no packages) are logged and do
/// not fail the command.
pub async fn execute(
    kind: TargetKind,
    args: ScanArgs,
    mut config: LayerscanConfig,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    args.options.apply(&mut config);
    args.cache.apply(&mut config);
    config.validate()?;

    let inspector_config = InspectorConfig::from_core(&config.scan)?;
    let cache = cache::from_config(&config.cache).await?;
    let inspector = Inspector::new(
        Arc::clone(&cache),
        &AnalyzerRegistry::builtin(),
        inspector_config,
    )?;

    let cancel = CancellationToken::new();
    let signal_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling scan");
                cancel.cancel();
            }
        })
    };

    info!(
        path = %args.target.display(),
        kind = ?kind,
        backend = %config.cache.backend,
        "starting scan"
    );

    let result = inspect(kind, &args, &inspector, &cancel).await;
    signal_task.abort();
    let reference = result?;

    let outcome = Applier::new(cache)
        .apply_layers(&reference.id, &reference.blob_ids)
        .await?;
    if let Some(warning) = outcome.warning {
        warn!(artifact = %reference.name, warning = %warning, "scan finished with warning");
    }

    let report = ScanReport::new(&reference, &outcome, args.list_all_pkgs);
    writer.render(&report)?;
    Ok(())
}

async fn inspect(
    kind: TargetKind,
    args: &ScanArgs,
    inspector: &Inspector,
    cancel: &CancellationToken,
) -> Result<ArtifactReference, CliError> {
    let reference = match kind {
        TargetKind::Filesystem => {
            inspector
                .inspect(&LocalSource::filesystem(&args.target), cancel)
                .await?
        }
        TargetKind::Repository => {
            inspector
                .inspect(&LocalSource::repository(&args.target), cancel)
                .await?
        }
        TargetKind::Image => {
            let source = ImageSource::open(&args.target).await?;
            inspector.inspect(&source, cancel).await?
        }
        TargetKind::Sbom => {
            let source = SbomSource::open(&args.target).await?;
            inspector.inspect(&source, cancel).await?
        }
    };
    Ok(reference)
}

// ─── Report ──────────────────────────────────────────────────────────

/// Scan report: artifact identity plus the merged view summary.
#[derive(Debug, Serialize)]
pub struct ScanReport {
    pub artifact: String,
    pub artifact_type: String,
    pub artifact_id: String,
    pub blob_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub os_packages: usize,
    pub applications: Vec<ApplicationSummary>,
    pub secrets: usize,
    pub misconfigurations: usize,
    pub licenses: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Present only with `--list-all-pkgs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub packages: Option<Vec<PackageRow>>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationSummary {
    #[serde(rename = "type")]
    pub app_type: String,
    pub file_path: String,
    pub libraries: usize,
}

#[derive(Debug, Serialize)]
pub struct PackageRow {
    pub source: String,
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub layer: String,
}

impl PackageRow {
    fn new(source: &str, pkg: &Package) -> Self {
        let version = if pkg.release.is_empty() {
            pkg.version.clone()
        } else {
            format!("{}-{}", pkg.version, pkg.release)
        };
        Self {
            source: source.to_owned(),
            name: pkg.name.clone(),
            version,
            layer: pkg.layer.diff_id.clone(),
        }
    }
}

impl ScanReport {
    pub fn new(reference: &ArtifactReference, outcome: &ApplyOutcome, list_all: bool) -> Self {
        let detail = &outcome.detail;

        let packages = list_all.then(|| {
            let os_source = detail
                .os
                .as_ref()
                .map(|os| os.family.clone())
                .unwrap_or_else(|| "os".to_owned());
            let mut rows: Vec<PackageRow> = detail
                .packages
                .iter()
                .map(|p| PackageRow::new(&os_source, p))
                .collect();
            for app in &detail.applications {
                rows.extend(
                    app.libraries
                        .iter()
                        .map(|p| PackageRow::new(&app.file_path, p)),
                );
            }
            rows
        });

        Self {
            artifact: reference.name.clone(),
            artifact_type: reference.artifact_type.to_string(),
            artifact_id: reference.id.clone(),
            blob_ids: reference.blob_ids.clone(),
            os: detail.os.as_ref().map(ToString::to_string),
            repository: detail
                .repository
                .as_ref()
                .map(|r| format!("{} {}", r.family, r.release)),
            os_packages: detail.packages.len(),
            applications: detail
                .applications
                .iter()
                .map(|a| ApplicationSummary {
                    app_type: a.app_type.clone(),
                    file_path: a.file_path.clone(),
                    libraries: a.libraries.len(),
                })
                .collect(),
            secrets: detail.secrets.len() + usize::from(detail.image_config.secret.is_some()),
            misconfigurations: detail.misconfigurations.len()
                + usize::from(detail.image_config.misconfiguration.is_some()),
            licenses: detail.licenses.len(),
            warning: outcome.warning.map(|w| w.to_string()),
            packages,
        }
    }
}

impl Render for ScanReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(
            w,
            "{} ({})",
            self.artifact.bold(),
            self.artifact_type
        )?;
        writeln!(w, "  Artifact ID: {}", self.artifact_id)?;
        writeln!(w, "  Layers:      {}", self.blob_ids.len())?;
        writeln!(
            w,
            "  OS:          {}",
            self.os.as_deref().unwrap_or("-")
        )?;
        if let Some(repo) = &self.repository {
            writeln!(w, "  Repository:  {repo}")?;
        }
        writeln!(w, "  OS packages: {}", self.os_packages)?;
        writeln!(w)?;

        if !self.applications.is_empty() {
            writeln!(w, "{:<10} {:<50} {:>9}", "Type", "Path", "Libraries")?;
            writeln!(w, "{}", "-".repeat(71))?;
            for app in &self.applications {
                writeln!(
                    w,
                    "{:<10} {:<50} {:>9}",
                    app.app_type, app.file_path, app.libraries
                )?;
            }
            writeln!(w)?;
        }

        let mut findings = BTreeMap::new();
        findings.insert("Secrets", self.secrets);
        findings.insert("Misconfigurations", self.misconfigurations);
        findings.insert("Licenses", self.licenses);
        for (label, count) in findings {
            let value = if count > 0 && label != "Licenses" {
                count.to_string().yellow().to_string()
            } else {
                count.to_string()
            };
            writeln!(w, "  {label}: {value}")?;
        }

        if let Some(packages) = &self.packages {
            writeln!(w)?;
            writeln!(w, "{:<30} {:<30} {:<20}", "Source", "Package", "Version")?;
            writeln!(w, "{}", "-".repeat(82))?;
            for row in packages {
                writeln!(w, "{:<30} {:<30} {:<20}", row.source, row.name, row.version)?;
            }
        }

        if let Some(warning) = &self.warning {
            writeln!(w)?;
            writeln!(w, "{} {}", "warning:".yellow().bold(), warning)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use layerscan_core::types::{Application, ArtifactDetail, ArtifactType, Os};
    use layerscan_inspector::ApplyWarning;

    fn pkg(name: &str, version: &str) -> Package {
        Package {
            id: Package::make_id(name, version),
            name: name.to_owned(),
            version: version.to_owned(),
            ..Default::default()
        }
    }

    fn reference() -> ArtifactReference {
        ArtifactReference {
            id: "sha256:art".to_owned(),
            artifact_type: ArtifactType::ContainerImage,
            name: "alpine:3.11".to_owned(),
            blob_ids: vec!["sha256:blob".to_owned()],
        }
    }

    fn outcome() -> ApplyOutcome {
        ApplyOutcome {
            detail: ArtifactDetail {
                os: Some(Os {
                    family: "alpine".to_owned(),
                    name: "3.11.6".to_owned(),
                }),
                packages: vec![pkg("musl", "1.1.24-r2")],
                applications: vec![Application {
                    app_type: "npm".to_owned(),
                    file_path: "app/package-lock.json".to_owned(),
                    libraries: vec![pkg("express", "4.18.2")],
                }],
                ..Default::default()
            },
            warning: None,
        }
    }

    #[test]
    fn test_report_summary_without_package_list() {
        let report = ScanReport::new(&reference(), &outcome(), false);
        assert_eq!(report.os.as_deref(), Some("alpine 3.11.6"));
        assert_eq!(report.os_packages, 1);
        assert_eq!(report.applications[0].libraries, 1);
        assert!(report.packages.is_none());

        let json = serde_json::to_value(&report).expect("serialize");
        assert!(json.get("packages").is_none());
        assert_eq!(json["applications"][0]["type"], "npm");
    }

    #[test]
    fn test_report_lists_all_packages() {
        let report = ScanReport::new(&reference(), &outcome(), true);
        let rows = report.packages.expect("package list");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].source, "alpine");
        assert_eq!(rows[0].name, "musl");
        assert_eq!(rows[1].source, "app/package-lock.json");
    }

    #[test]
    fn test_report_render_text_includes_warning() {
        let mut outcome = outcome();
        outcome.detail.packages.clear();
        outcome.warning = Some(ApplyWarning::NoPackagesDetected);

        let report = ScanReport::new(&reference(), &outcome, false);
        let mut buffer = Vec::new();
        report.render_text(&mut buffer).expect("render");
        let output = String::from_utf8(buffer).expect("valid UTF-8");
        assert!(output.contains("alpine:3.11"));
        assert!(output.contains("OS packages: 0"));
        assert!(output.contains("app/package-lock.json"));
        assert!(output.contains("no packages detected"));
    }
}
