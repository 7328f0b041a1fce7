//! pnpm-lock.yaml 분석기
//!
//! 세 가지 키 형식을 지원합니다.
//!
//! - v5: `/lodash/4.17.21`, 피어 접미사 `_react@18.2.0`
//! - v6: `/lodash@4.17.21`, 피어 접미사 `(react@18.2.0)`
//! - v9: `lodash@4.17.21`, 의존성은 `snapshots` 섹션
//!
//! 직접 의존성은 최상위 `dependencies` 또는 `importers["."]`에서 판단합니다.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_yaml::Value;

use layerscan_core::types::{Application, Package};

use crate::analyzer::{
    AnalysisInput, AnalysisResult, Analyzer, AnalyzerOutcome, AnalyzerType, analyzer_error,
    file_name, read_text,
};
use crate::error::InspectorError;
use crate::walker::FileInfo;

/// pnpm-lock.yaml 분석기
pub struct PnpmLockAnalyzer;

#[derive(Deserialize)]
struct PnpmLock {
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: BTreeMap<String, Value>,
    #[serde(default)]
    importers: BTreeMap<String, PnpmImporter>,
    #[serde(default)]
    packages: BTreeMap<String, PnpmPackage>,
    #[serde(default)]
    snapshots: BTreeMap<String, PnpmPackage>,
}

#[derive(Deserialize)]
struct PnpmImporter {
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: BTreeMap<String, Value>,
}

#[derive(Deserialize, Default)]
struct PnpmPackage {
    #[serde(default)]
    dev: Option<bool>,
    #[serde(default)]
    dependencies: BTreeMap<String, Value>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: BTreeMap<String, Value>,
}

impl Analyzer for PnpmLockAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Pnpm
    }

    fn version(&self) -> u32 {
        1
    }

    fn required(&self, file_path: &str, _info: &FileInfo) -> bool {
        file_name(file_path) == "pnpm-lock.yaml" && !file_path.contains("node_modules/")
    }

    fn analyze(&self, mut input: AnalysisInput<'_>) -> AnalyzerOutcome {
        let libraries = match read_text(AnalyzerType::Pnpm, &mut input)
            .and_then(|text| parse_pnpm_lock(&text, input.file_path))
        {
            Ok(libraries) => libraries,
            Err(e) => return AnalyzerOutcome::Failed(e),
        };

        if libraries.is_empty() {
            return AnalyzerOutcome::Skipped;
        }

        AnalyzerOutcome::Applicable(AnalysisResult {
            applications: vec![Application {
                app_type: "pnpm".to_owned(),
                file_path: input.file_path.to_owned(),
                libraries,
            }],
            ..Default::default()
        })
    }
}

/// pnpm-lock.yaml 내용을 라이브러리 목록으로 파싱합니다.
pub fn parse_pnpm_lock(content: &str, source_path: &str) -> Result<Vec<Package>, InspectorError> {
    let lock: PnpmLock = serde_yaml::from_str(content)
        .map_err(|e| analyzer_error(AnalyzerType::Pnpm, source_path, e))?;

    let mut direct: BTreeSet<String> = BTreeSet::new();
    for (name, value) in lock.dependencies.iter().chain(&lock.optional_dependencies) {
        if let Some(version) = dependency_version(value) {
            direct.insert(Package::make_id(name, &version));
        }
    }
    if let Some(root) = lock.importers.get(".") {
        for (name, value) in root.dependencies.iter().chain(&root.optional_dependencies) {
            if let Some(version) = dependency_version(value) {
                direct.insert(Package::make_id(name, &version));
            }
        }
    }

    let mut libraries: BTreeMap<String, Package> = BTreeMap::new();
    for (key, pkg) in &lock.packages {
        if pkg.dev == Some(true) {
            continue;
        }
        let Some((name, version)) = parse_package_key(key) else {
            continue;
        };
        let id = Package::make_id(&name, &version);
        libraries.entry(id.clone()).or_insert_with(|| Package {
            indirect: !direct.contains(&id),
            id,
            name,
            version,
            ..Default::default()
        });
    }

    // v9는 의존성이 snapshots에, 이전 버전은 packages에 있습니다.
    let graph = if lock.snapshots.is_empty() {
        &lock.packages
    } else {
        &lock.snapshots
    };
    for (key, pkg) in graph {
        let Some((name, version)) = parse_package_key(key) else {
            continue;
        };
        let id = Package::make_id(&name, &version);
        let deps: BTreeSet<String> = pkg
            .dependencies
            .iter()
            .chain(&pkg.optional_dependencies)
            .filter_map(|(dep, value)| {
                let version = dependency_version(value)?;
                let dep_id = Package::make_id(dep, &version);
                libraries.contains_key(&dep_id).then_some(dep_id)
            })
            .collect();
        if let Some(lib) = libraries.get_mut(&id) {
            lib.depends_on = lib
                .depends_on
                .iter()
                .cloned()
                .chain(deps)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
        }
    }

    Ok(libraries.into_values().collect())
}

/// 의존성 값에서 버전을 꺼냅니다.
///
/// 값은 `"4.17.21"` 문자열이거나 `{specifier, version}` 매핑입니다.
/// `link:` 로컬 의존성은 무시합니다.
fn dependency_version(value: &Value) -> Option<String> {
    let raw = match value {
        Value::String(s) => s.as_str(),
        Value::Number(n) => return Some(n.to_string()),
        Value::Mapping(map) => map.get("version")?.as_str()?,
        _ => return None,
    };
    if raw.starts_with("link:") || raw.starts_with("file:") {
        return None;
    }
    Some(strip_peer_suffix(raw).to_owned())
}

/// `/name/1.0.0`, `/name@1.0.0(peer@1)`, `@scope/name@1.0.0` 형식의 키를 나눕니다.
fn parse_package_key(key: &str) -> Option<(String, String)> {
    let key = key.strip_prefix('/').unwrap_or(key);
    let key = &key[..key.find('(').unwrap_or(key.len())];

    // `@` 구분 (v6, v9). scoped 패키지의 첫 `@`는 건너뜁니다.
    if let Some(pos) = key.rfind('@').filter(|pos| *pos > 0) {
        let (name, version) = (&key[..pos], strip_peer_suffix(&key[pos + 1..]));
        if is_package_name(name) && !version.is_empty() {
            return Some((name.to_owned(), version.to_owned()));
        }
    }

    // `/` 구분 (v5)
    let pos = key.rfind('/')?;
    let (name, version) = (&key[..pos], strip_peer_suffix(&key[pos + 1..]));
    if !is_package_name(name) || version.is_empty() {
        return None;
    }
    Some((name.to_owned(), version.to_owned()))
}

/// `name` 또는 `@scope/name` 형식인지 확인합니다.
fn is_package_name(name: &str) -> bool {
    match name.strip_prefix('@') {
        Some(rest) => rest.matches('/').count() == 1 && !rest.ends_with('/'),
        None => !name.is_empty() && !name.contains('/'),
    }
}

/// 버전 문자열에서 `(react@18.2.0)` 또는 `_react@18.2.0` 피어 접미사를 제거합니다.
fn strip_peer_suffix(version: &str) -> &str {
    let end = version.find(['(', '_']).unwrap_or(version.len());
    &version[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    const V6_LOCK: &str = r#"
lockfileVersion: '6.0'

dependencies:
  express:
    specifier: ^4.18.2
    version: 4.18.2

devDependencies:
  jest:
    specifier: ^29.0.0
    version: 29.7.0

packages:

  /express@4.18.2:
    resolution: {integrity: sha512-abc}
    dependencies:
      debug: 2.6.9
    dev: false

  /debug@2.6.9:
    resolution: {integrity: sha512-def}
    dev: false

  /jest@29.7.0:
    resolution: {integrity: sha512-ghi}
    dev: true

  /@types/node@20.1.0(typescript@5.0.0):
    resolution: {integrity: sha512-jkl}
    dev: false
"#;

    const V5_LOCK: &str = r#"
lockfileVersion: 5.4

dependencies:
  lodash: 4.17.21

packages:

  /lodash/4.17.21:
    resolution: {integrity: sha512-v2kDE}
    dev: false

  /react-dom/18.2.0_react@18.2.0:
    resolution: {integrity: sha512-xyz}
    dev: false
"#;

    const V9_LOCK: &str = r#"
lockfileVersion: '9.0'

importers:
  .:
    dependencies:
      express:
        specifier: ^4.18.2
        version: 4.18.2

packages:
  express@4.18.2:
    resolution: {integrity: sha512-abc}
  ms@2.0.0:
    resolution: {integrity: sha512-def}

snapshots:
  express@4.18.2:
    dependencies:
      ms: 2.0.0
  ms@2.0.0: {}
"#;

    #[test]
    fn parses_v6_lock() {
        let libs = parse_pnpm_lock(V6_LOCK, "pnpm-lock.yaml").unwrap();
        let ids: Vec<_> = libs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["@types/node@20.1.0", "debug@2.6.9", "express@4.18.2"]);

        let express = &libs[2];
        assert!(!express.indirect);
        assert_eq!(express.depends_on, vec!["debug@2.6.9"]);
        assert!(libs[1].indirect);
    }

    #[test]
    fn parses_v5_lock() {
        let libs = parse_pnpm_lock(V5_LOCK, "pnpm-lock.yaml").unwrap();
        let ids: Vec<_> = libs.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["lodash@4.17.21", "react-dom@18.2.0"]);
        assert!(!libs[0].indirect);
    }

    #[test]
    fn parses_v9_snapshots() {
        let libs = parse_pnpm_lock(V9_LOCK, "pnpm-lock.yaml").unwrap();
        assert_eq!(libs.len(), 2);
        let express = libs.iter().find(|p| p.name == "express").unwrap();
        assert!(!express.indirect);
        assert_eq!(express.depends_on, vec!["ms@2.0.0"]);
    }

    #[test]
    fn package_key_formats() {
        assert_eq!(
            parse_package_key("/lodash/4.17.21"),
            Some(("lodash".to_owned(), "4.17.21".to_owned()))
        );
        assert_eq!(
            parse_package_key("/@babel/core/7.22.0"),
            Some(("@babel/core".to_owned(), "7.22.0".to_owned()))
        );
        assert_eq!(
            parse_package_key("@babel/core@7.22.0(supports-color@5.5.0)"),
            Some(("@babel/core".to_owned(), "7.22.0".to_owned()))
        );
        assert_eq!(
            parse_package_key("/@babel/core/7.22.0_supports-color@5.5.0"),
            Some(("@babel/core".to_owned(), "7.22.0".to_owned()))
        );
        assert_eq!(parse_package_key("garbage"), None);
    }

    #[test]
    fn invalid_yaml_returns_error() {
        let err = parse_pnpm_lock("packages: [unclosed", "pnpm-lock.yaml").unwrap_err();
        assert!(err.to_string().contains("unable to parse pnpm-lock.yaml"));
    }
}
