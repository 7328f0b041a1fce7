//! 분석기 레지스트리와 파일 디스패치
//!
//! [`Analyzer`] trait은 파일 하나를 인식하고 파싱하는 단위입니다.
//! [`AnalyzerRegistry`]는 프로세스 시작 시 한 번 만들어지는 불변 테이블이고,
//! [`AnalyzerGroup`]은 비활성화 목록을 적용한 스캔 단위 뷰입니다.
//!
//! # 내장 분석기
//!
//! | 유형 | 대상 파일 | 결과 |
//! |------|-----------|------|
//! | `alpine` | `etc/alpine-release` | OS |
//! | `debian` | `etc/debian_version` | OS |
//! | `apk-repo` | `etc/apk/repositories` | Repository |
//! | `apk` | `lib/apk/db/installed` | OS 패키지 |
//! | `npm` | `package-lock.json` | npm 라이브러리 |
//! | `pnpm` | `pnpm-lock.yaml` | pnpm 라이브러리 |
//! | `cargo` | `Cargo.lock` | cargo 라이브러리 |
//! | `secret` | 텍스트 파일 | 시크릿 (best-effort) |
//! | `license-header` | 소스 파일 | SPDX 라이선스 (best-effort) |
//!
//! # 확장
//!
//! 새 형식을 지원하려면 `Analyzer`를 구현하고 [`AnalyzerRegistry::new`]에 넘깁니다.

pub mod apk;
pub mod cargo;
pub mod license;
pub mod npm;
pub mod os;
pub mod pnpm;
pub mod repo;
pub mod secret;

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use layerscan_core::metrics as m;
use layerscan_core::types::{
    Application, BLOB_SCHEMA_VERSION, BlobInfo, LicenseFile, Misconfiguration, Os, PackageInfo,
    Repository, Secret,
};

use crate::error::InspectorError;
use crate::walker::FileInfo;

/// 분석기 유형
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum AnalyzerType {
    Alpine,
    Debian,
    ApkRepo,
    Apk,
    Npm,
    Pnpm,
    Cargo,
    Secret,
    LicenseHeader,
}

impl AnalyzerType {
    /// 모든 유형
    pub const ALL: [AnalyzerType; 9] = [
        Self::Alpine,
        Self::Debian,
        Self::ApkRepo,
        Self::Apk,
        Self::Npm,
        Self::Pnpm,
        Self::Cargo,
        Self::Secret,
        Self::LicenseHeader,
    ];

    /// 설정과 캐시 키에 쓰이는 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alpine => "alpine",
            Self::Debian => "debian",
            Self::ApkRepo => "apk-repo",
            Self::Apk => "apk",
            Self::Npm => "npm",
            Self::Pnpm => "pnpm",
            Self::Cargo => "cargo",
            Self::Secret => "secret",
            Self::LicenseHeader => "license-header",
        }
    }

    /// 문자열에서 유형을 파싱합니다 (대소문자, `_`/`-` 구분 무시).
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL.into_iter().find(|t| t.as_str() == normalized)
    }
}

impl fmt::Display for AnalyzerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `Read + Seek` 트레이트 객체용 보조 trait
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// 분석기 입력
pub struct AnalysisInput<'a> {
    /// 레이어 루트 기준 상대 경로
    pub file_path: &'a str,
    /// 파일 내용 (처음 위치로 되감긴 상태로 전달됨)
    pub content: &'a mut dyn ReadSeek,
    /// 파일 메타데이터
    pub info: &'a FileInfo,
}

/// 분석 결과 종류
#[derive(Debug)]
pub enum AnalyzerOutcome {
    /// 결과가 있음
    Applicable(AnalysisResult),
    /// 인식했지만 해당 없음 (빈 결과로 취급)
    Skipped,
    /// 실패
    Failed(InspectorError),
}

/// 레이어 블롭에 합쳐지는 분석 결과 누적기
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisResult {
    pub os: Option<Os>,
    /// `os`를 만든 파일 경로
    pub os_source: Option<String>,
    pub repository: Option<Repository>,
    /// `repository`를 만든 파일 경로
    pub repository_source: Option<String>,
    pub package_infos: Vec<PackageInfo>,
    pub applications: Vec<Application>,
    pub misconfigurations: Vec<Misconfiguration>,
    pub secrets: Vec<Secret>,
    pub licenses: Vec<LicenseFile>,
}

impl AnalysisResult {
    pub fn is_empty(&self) -> bool {
        self.os.is_none()
            && self.repository.is_none()
            && self.package_infos.is_empty()
            && self.applications.is_empty()
            && self.misconfigurations.is_empty()
            && self.secrets.is_empty()
            && self.licenses.is_empty()
    }

    /// 출처 경로가 비어 있는 OS/Repository에 `file_path`를 기록합니다.
    pub fn tag_source(&mut self, file_path: &str) {
        if self.os.is_some() && self.os_source.is_none() {
            self.os_source = Some(file_path.to_owned());
        }
        if self.repository.is_some() && self.repository_source.is_none() {
            self.repository_source = Some(file_path.to_owned());
        }
    }

    /// 다른 결과를 합칩니다.
    ///
    /// OS와 Repository 후보가 여럿이면 출처 경로가 가장 작은 것을 고릅니다.
    /// 워커가 결과를 넘기는 순서와 관계없이 같은 후보가 선택됩니다.
    pub fn merge(&mut self, other: AnalysisResult) {
        prefer_lowest_source(
            &mut self.os,
            &mut self.os_source,
            other.os,
            other.os_source,
        );
        prefer_lowest_source(
            &mut self.repository,
            &mut self.repository_source,
            other.repository,
            other.repository_source,
        );
        self.package_infos.extend(other.package_infos);
        self.applications.extend(other.applications);
        self.misconfigurations.extend(other.misconfigurations);
        self.secrets.extend(other.secrets);
        self.licenses.extend(other.licenses);
    }

    /// 정렬된 블롭으로 변환합니다.
    ///
    /// 워커의 처리 순서와 관계없이 같은 입력이면 같은 블롭이 되도록
    /// 모든 목록을 경로/이름 순으로 정렬합니다.
    pub fn into_blob(self) -> BlobInfo {
        let mut package_infos = self.package_infos;
        for info in &mut package_infos {
            info.packages
                .sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        }
        package_infos.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        let mut applications = self.applications;
        for app in &mut applications {
            app.libraries
                .sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
        }
        applications.sort_by(|a, b| (&a.app_type, &a.file_path).cmp(&(&b.app_type, &b.file_path)));

        let mut misconfigurations = self.misconfigurations;
        misconfigurations.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        let mut secrets = self.secrets;
        secrets.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        let mut licenses = self.licenses;
        licenses.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        BlobInfo {
            schema_version: BLOB_SCHEMA_VERSION,
            os: self.os,
            repository: self.repository,
            package_infos,
            applications,
            misconfigurations,
            secrets,
            licenses,
            ..Default::default()
        }
    }
}

fn prefer_lowest_source<T>(
    current: &mut Option<T>,
    current_source: &mut Option<String>,
    candidate: Option<T>,
    candidate_source: Option<String>,
) {
    let Some(candidate) = candidate else { return };
    if current.is_none() || candidate_source < *current_source {
        *current = Some(candidate);
        *current_source = candidate_source;
    }
}

/// 분석기 trait
///
/// 구현체는 레지스트리에 한 번 등록된 뒤 여러 워커 스레드에서 동시에 호출됩니다.
/// 상태를 가지지 않거나 읽기 전용이어야 합니다.
pub trait Analyzer: Send + Sync {
    /// 분석기 유형
    fn analyzer_type(&self) -> AnalyzerType;

    /// 분석 로직 버전. 바꾸면 블롭 ID가 바뀌어 이전 캐시를 쓰지 않게 됩니다.
    fn version(&self) -> u32;

    /// 파일 이름/확장자/실행 비트로 분석 대상인지 빠르게 판단합니다.
    fn required(&self, file_path: &str, info: &FileInfo) -> bool;

    /// 파일을 분석합니다.
    fn analyze(&self, input: AnalysisInput<'_>) -> AnalyzerOutcome;

    /// 실패해도 레이어 분석을 계속하는지 여부
    fn is_best_effort(&self) -> bool {
        false
    }
}

// ─── Registry ───────────────────────────────────────────────────────

/// 불변 분석기 테이블
#[derive(Clone)]
pub struct AnalyzerRegistry {
    analyzers: Vec<Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    /// 지정한 분석기로 레지스트리를 만듭니다.
    pub fn new(analyzers: Vec<Arc<dyn Analyzer>>) -> Self {
        Self { analyzers }
    }

    /// 내장 분석기 전체로 레지스트리를 만듭니다.
    pub fn builtin() -> Self {
        Self::new(vec![
            Arc::new(os::AlpineReleaseAnalyzer),
            Arc::new(os::DebianVersionAnalyzer),
            Arc::new(repo::ApkRepoAnalyzer),
            Arc::new(apk::ApkDbAnalyzer),
            Arc::new(npm::NpmLockAnalyzer),
            Arc::new(pnpm::PnpmLockAnalyzer),
            Arc::new(cargo::CargoLockAnalyzer),
            Arc::new(secret::SecretAnalyzer::new()),
            Arc::new(license::LicenseHeaderAnalyzer),
        ])
    }

    /// 등록된 분석기 목록
    pub fn analyzers(&self) -> &[Arc<dyn Analyzer>] {
        &self.analyzers
    }

    /// 비활성화 목록을 제외한 스캔용 그룹을 만듭니다.
    pub fn group(&self, disabled: &[AnalyzerType]) -> AnalyzerGroup {
        let analyzers = self
            .analyzers
            .iter()
            .filter(|a| !disabled.contains(&a.analyzer_type()))
            .cloned()
            .collect();
        AnalyzerGroup { analyzers }
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// 한 번의 스캔에서 사용하는 활성 분석기 집합
#[derive(Clone)]
pub struct AnalyzerGroup {
    analyzers: Vec<Arc<dyn Analyzer>>,
}

impl AnalyzerGroup {
    /// 활성 분석기의 `{유형 -> 버전}` (캐시 키 계산용, 이름순 정렬)
    pub fn versions(&self) -> BTreeMap<String, u32> {
        self.analyzers
            .iter()
            .map(|a| (a.analyzer_type().as_str().to_owned(), a.version()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }

    /// 파일 하나에 해당하는 분석기를 모두 실행하고 결과를 합칩니다.
    ///
    /// 각 분석기 앞에서 파일 위치를 처음으로 되감습니다.
    /// best-effort 분석기의 실패는 경고 후 무시하고, 그 외 실패는 즉시 반환합니다.
    pub fn analyze_file(
        &self,
        file_path: &str,
        info: &FileInfo,
        content: &mut dyn ReadSeek,
    ) -> Result<Option<AnalysisResult>, InspectorError> {
        let mut merged: Option<AnalysisResult> = None;

        for analyzer in &self.analyzers {
            if !analyzer.required(file_path, info) {
                continue;
            }

            content
                .seek(SeekFrom::Start(0))
                .map_err(|source| InspectorError::Io {
                    path: file_path.to_owned(),
                    source,
                })?;

            let input = AnalysisInput {
                file_path,
                content: &mut *content,
                info,
            };

            match analyzer.analyze(input) {
                AnalyzerOutcome::Applicable(mut result) => {
                    result.tag_source(file_path);
                    merged.get_or_insert_with(AnalysisResult::default).merge(result);
                }
                AnalyzerOutcome::Skipped => {
                    trace!(
                        analyzer = %analyzer.analyzer_type(),
                        path = %file_path,
                        "analyzer skipped"
                    );
                }
                AnalyzerOutcome::Failed(err) => {
                    metrics::counter!(
                        m::ANALYZER_ERRORS_TOTAL,
                        m::LABEL_ANALYZER => analyzer.analyzer_type().as_str()
                    )
                    .increment(1);

                    if analyzer.is_best_effort() {
                        warn!(
                            analyzer = %analyzer.analyzer_type(),
                            path = %file_path,
                            error = %err,
                            "best-effort analyzer failed, continuing"
                        );
                        continue;
                    }
                    return Err(err);
                }
            }
        }

        Ok(merged.filter(|r| !r.is_empty()))
    }
}

// ─── Helpers ────────────────────────────────────────────────────────

/// 분석기 실패 에러를 만듭니다.
pub(crate) fn analyzer_error(
    analyzer: AnalyzerType,
    file_path: &str,
    reason: impl fmt::Display,
) -> InspectorError {
    InspectorError::Analyzer {
        analyzer: analyzer.as_str().to_owned(),
        path: file_path.to_owned(),
        reason: reason.to_string(),
    }
}

/// 입력 전체를 UTF-8 문자열로 읽습니다.
pub(crate) fn read_text(
    analyzer: AnalyzerType,
    input: &mut AnalysisInput<'_>,
) -> Result<String, InspectorError> {
    let mut buf = String::new();
    input
        .content
        .read_to_string(&mut buf)
        .map_err(|e| analyzer_error(analyzer, input.file_path, e))?;
    Ok(buf)
}

/// 경로의 마지막 구성요소 (파일 이름)
pub(crate) fn file_name(file_path: &str) -> &str {
    file_path.rsplit('/').next().unwrap_or(file_path)
}
