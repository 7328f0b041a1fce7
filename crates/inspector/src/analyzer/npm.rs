//! package-lock.json 분석기
//!
//! [`NpmLockAnalyzer`]는 NPM의 package-lock.json (v2/v3) 파일을 파싱하여
//! `npm` 애플리케이션을 만듭니다.
//!
//! # package-lock.json v3 형식 예시
//!
//! ```json
//! {
//!   "name": "my-app",
//!   "lockfileVersion": 3,
//!   "packages": {
//!     "": { "name": "my-app", "version": "1.0.0", "dependencies": { "express": "^4" } },
//!     "node_modules/express": { "version": "4.18.2", "dependencies": { "debug": "2.6.9" } },
//!     "node_modules/debug": { "version": "2.6.9" }
//!   }
//! }
//! ```
//!
//! - 루트(`""`)의 `dependencies`/`optionalDependencies`에 있는 최상위 패키지는 직접 의존성,
//!   나머지는 간접 의존성입니다.
//! - `dev: true` 항목과 `link: true` 항목은 제외합니다.
//! - `dependencies`는 node 모듈 해석 규칙(가장 가까운 `node_modules`부터 위로)에 따라
//!   패키지 ID로 바뀝니다.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Deserialize;

use layerscan_core::types::{Application, Package};

use crate::analyzer::{
    AnalysisInput, AnalysisResult, Analyzer, AnalyzerOutcome, AnalyzerType, analyzer_error,
    file_name, read_text,
};
use crate::error::InspectorError;
use crate::walker::FileInfo;

const NODE_MODULES: &str = "node_modules/";

/// package-lock.json 분석기
pub struct NpmLockAnalyzer;

/// package-lock.json 구조 (파싱용)
#[derive(Deserialize)]
struct NpmLockFile {
    #[serde(default)]
    packages: BTreeMap<String, NpmPackageEntry>,
}

/// package-lock.json 내 개별 패키지 (파싱용)
#[derive(Deserialize)]
struct NpmPackageEntry {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    dev: bool,
    #[serde(default)]
    link: bool,
    #[serde(default)]
    dependencies: HashMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    optional_dependencies: HashMap<String, String>,
}

impl Analyzer for NpmLockAnalyzer {
    fn analyzer_type(&self) -> AnalyzerType {
        AnalyzerType::Npm
    }

    fn version(&self) -> u32 {
        1
    }

    fn required(&self, file_path: &str, _info: &FileInfo) -> bool {
        file_name(file_path) == "package-lock.json" && !file_path.contains(NODE_MODULES)
    }

    fn analyze(&self, mut input: AnalysisInput<'_>) -> AnalyzerOutcome {
        let libraries = match read_text(AnalyzerType::Npm, &mut input)
            .and_then(|text| parse_package_lock(&text, input.file_path))
        {
            Ok(libraries) => libraries,
            Err(e) => return AnalyzerOutcome::Failed(e),
        };

        if libraries.is_empty() {
            return AnalyzerOutcome::Skipped;
        }

        AnalyzerOutcome::Applicable(AnalysisResult {
            applications: vec![Application {
                app_type: "npm".to_owned(),
                file_path: input.file_path.to_owned(),
                libraries,
            }],
            ..Default::default()
        })
    }
}

/// package-lock.json 내용을 라이브러리 목록으로 파싱합니다.
pub fn parse_package_lock(
    content: &str,
    source_path: &str,
) -> Result<Vec<Package>, InspectorError> {
    let lock_file: NpmLockFile = serde_json::from_str(content)
        .map_err(|e| analyzer_error(AnalyzerType::Npm, source_path, e))?;

    let direct: BTreeSet<&str> = lock_file
        .packages
        .get("")
        .map(|root| {
            root.dependencies
                .keys()
                .chain(root.optional_dependencies.keys())
                .map(String::as_str)
                .collect()
        })
        .unwrap_or_default();

    // 설치 경로 -> 패키지 ID
    let mut id_by_path: HashMap<&str, String> = HashMap::new();
    for (key, entry) in &lock_file.packages {
        if key.is_empty() || entry.link || !key.contains(NODE_MODULES) {
            continue;
        }
        let Some(version) = entry.version.as_deref() else {
            continue; // 버전 없는 항목은 건너뜀
        };
        id_by_path.insert(key.as_str(), Package::make_id(&extract_package_name(key), version));
    }

    let mut libraries: BTreeMap<String, Package> = BTreeMap::new();
    for (key, entry) in &lock_file.packages {
        if entry.dev {
            continue;
        }
        let Some(id) = id_by_path.get(key.as_str()) else {
            continue;
        };

        let name = extract_package_name(key);
        let is_direct = key.strip_prefix(NODE_MODULES) == Some(name.as_str())
            && direct.contains(name.as_str());

        let depends_on: BTreeSet<String> = entry
            .dependencies
            .keys()
            .chain(entry.optional_dependencies.keys())
            .filter_map(|dep| resolve_dependency(key, dep, &id_by_path))
            .collect();

        libraries
            .entry(id.clone())
            .and_modify(|existing| {
                existing.indirect &= !is_direct;
                existing.depends_on = existing
                    .depends_on
                    .iter()
                    .cloned()
                    .chain(depends_on.iter().cloned())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
            })
            .or_insert_with(|| Package {
                id: id.clone(),
                version: entry.version.clone().unwrap_or_default(),
                name,
                indirect: !is_direct,
                depends_on: depends_on.iter().cloned().collect(),
                ..Default::default()
            });
    }

    Ok(libraries.into_values().collect())
}

/// `parent` 위치에서 `dep`를 require했을 때 선택되는 패키지 ID를 찾습니다.
fn resolve_dependency(
    parent: &str,
    dep: &str,
    id_by_path: &HashMap<&str, String>,
) -> Option<String> {
    let mut base = parent;
    loop {
        let candidate = format!("{base}/{NODE_MODULES}{dep}");
        if let Some(id) = id_by_path.get(candidate.as_str()) {
            return Some(id.clone());
        }
        // 한 단계 위의 node_modules로 이동
        match base.rfind(&format!("/{NODE_MODULES}")) {
            Some(pos) => base = &base[..pos],
            None => break,
        }
    }
    id_by_path.get(format!("{NODE_MODULES}{dep}").as_str()).cloned()
}

/// "node_modules/@scope/name" 또는 "node_modules/name" 에서 패키지명 추출
fn extract_package_name(key: &str) -> String {
    // 마지막 "node_modules/" 이후의 부분을 패키지명으로 사용
    // scoped 패키지는 "node_modules/@scope/name" 형식
    if let Some(pos) = key.rfind(NODE_MODULES) {
        key[pos + NODE_MODULES.len()..].to_owned()
    } else {
        key.to_owned()
    }
}
