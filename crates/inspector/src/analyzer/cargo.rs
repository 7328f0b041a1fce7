//! Cargo.lock 분석기
//!
//! [`CargoLockAnalyzer`]는 Cargo.lock (v1-v4) 파일을 파싱하여 `cargo` 애플리케이션을 만듭니다.
//!
//! # Cargo.lock 형식 예시
//!
//! ```toml
//! version = 3
//!
//! [[package]]
//! name = "my-app"
//! version = "0.1.0"
//! dependencies = ["serde"]
//!
//! [[package]]
//! name = "serde"
//! version = "1.0.193"
//! source = "registry+https://github.com/rust-lang/crates.io-index"
//! checksum = "25dd9975e68d0cb5aa1120c288333fc98731bd1dd12f561e468ea4728c042b89"
//! ```
//!
//! - `source`가 없는 패키지는 워크스페이스 멤버로 보고 결과에서 제외합니다.
//!   멤버가 직접 의존하는 패키지가 직접 의존성입니다.
//! - `dependencies` 항목은 `name`, `name version`, `name version (source)` 형식입니다.
//! - 각 라이브러리는 `[[package]]` 블록의 줄 범위를 `locations`에 기록합니다.

use std::collections::{BTreeSet, HashMap};

use serde::Deserialize;

use layerscan_core::types::{Application, Location, Package};

use crate::analyzer::{
    AnalysisInput, AnalysisResult, Analyzer, AnalyzerOutcome, AnalyzerType, analyzer_error,
    file_name, read_text,
};
use crate::error::InspectorError;
use crate::walker::FileInfo;

/// Cargo.lock 분석기
pub struct CargoLockAnalyzer;

#[derive(Deserialize)]
struct CargoLockFile {
    #[serde(default, rename = "package")]
    packages: Vec<CargoPackage>,
}

#[derive(Deserialize)]
struct CargoPackage {
    name: String,
    version: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

impl Analyzer for CargoLockAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Cargo
    }

    fn version(&self) -> u32 {
        1
    }

    fn required(&self, file_path: &str, _info: &FileInfo) -> bool {
        file_name(file_path) == "Cargo.lock"
    }

    fn analyze(&self, mut input: AnalysisInput<'_>) -> AnalyzerOutcome {
        let libraries = match read_text(AnalyzerType::Cargo, &mut input)
            .and_then(|text| parse_cargo_lock(&text, input.file_path))
        {
            Ok(libraries) => libraries,
            Err(e) => return AnalyzerOutcome::Failed(e),
        };

        if libraries.is_empty() {
            return AnalyzerOutcome::Skipped;
        }

        AnalyzerOutcome::Applicable(AnalysisResult {
            applications: vec![Application {
                app_type: "cargo".to_owned(),
                file_path: input.file_path.to_owned(),
                libraries,
            }],
            ..Default::default()
        })
    }
}

/// Cargo.lock 내용을 라이브러리 목록으로 파싱합니다.
pub fn parse_cargo_lock(content: &str, source_path: &str) -> Result<Vec<Package>, InspectorError> {
    let lock: CargoLockFile = toml::from_str(content)
        .map_err(|e| analyzer_error(AnalyzerType::Cargo, source_path, e))?;

    let locations = package_block_locations(content);

    // 이름 -> 버전 목록 (이름만 적힌 의존성 해석용)
    let mut versions_by_name: HashMap<&str, Vec<&str>> = HashMap::new();
    for pkg in &lock.packages {
        versions_by_name
            .entry(pkg.name.as_str())
            .or_default()
            .push(pkg.version.as_str());
    }

    let resolve = |dep: &str| -> Option<String> {
        let mut parts = dep.split_whitespace();
        let name = parts.next()?;
        let versions = versions_by_name.get(name)?;
        match parts.next() {
            Some(version) if versions.contains(&version) => Some(Package::make_id(name, version)),
            Some(_) => None,
            None if versions.len() == 1 => Some(Package::make_id(name, versions[0])),
            None => None,
        }
    };

    let direct: BTreeSet<String> = lock
        .packages
        .iter()
        .filter(|p| p.source.is_none())
        .flat_map(|p| p.dependencies.iter())
        .filter_map(|d| resolve(d))
        .collect();
    let has_members = lock.packages.iter().any(|p| p.source.is_none());

    let mut seen = BTreeSet::new();
    let mut libraries = Vec::new();
    for (index, pkg) in lock.packages.iter().enumerate() {
        if pkg.source.is_none() {
            continue;
        }
        let id = Package::make_id(&pkg.name, &pkg.version);
        if !seen.insert(id.clone()) {
            continue;
        }

        let depends_on: BTreeSet<String> = pkg
            .dependencies
            .iter()
            .filter_map(|d| resolve(d))
            .collect();

        libraries.push(Package {
            indirect: has_members && !direct.contains(&id),
            id,
            name: pkg.name.clone(),
            version: pkg.version.clone(),
            depends_on: depends_on.into_iter().collect(),
            locations: locations.get(index).copied().into_iter().collect(),
            ..Default::default()
        });
    }

    Ok(libraries)
}

/// `[[package]]` 블록마다 시작/끝 줄 번호(1부터)를 계산합니다.
fn package_block_locations(content: &str) -> Vec<Location> {
    let mut locations = Vec::new();
    let mut current: Option<Location> = None;

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        let trimmed = line.trim();
        if trimmed == "[[package]]" {
            if let Some(done) = current.take() {
                locations.push(done);
            }
            current = Some(Location {
                start_line: line_no,
                end_line: line_no,
            });
        } else if trimmed.starts_with('[') {
            if let Some(done) = current.take() {
                locations.push(done);
            }
        } else if !trimmed.is_empty() {
            if let Some(loc) = current.as_mut() {
                loc.end_line = line_no;
            }
        }
    }
    if let Some(done) = current {
        locations.push(done);
    }

    locations
}
