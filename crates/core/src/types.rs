//! 도메인 타입: 아티팩트, 블롭, 패키지, 병합 결과
//!
//! 캐시에 저장되는 레코드([`BlobInfo`], [`ArtifactInfo`])와
//! 스캔 결과 핸들([`ArtifactReference`]), 병합 결과([`ArtifactDetail`])를 정의합니다.
//!
//! 캐시 레코드는 JSON으로 직렬화되므로 필드 이름은 저장 포맷의 일부입니다.
//! 필드를 바꾸면 [`BLOB_SCHEMA_VERSION`] 또는 [`ARTIFACT_SCHEMA_VERSION`]을 올려야 합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 블롭 레코드 스키마 버전. 0은 "레코드 없음"을 뜻합니다.
pub const BLOB_SCHEMA_VERSION: u32 = 2;

/// 아티팩트 레코드 스키마 버전. 0은 "레코드 없음"을 뜻합니다.
pub const ARTIFACT_SCHEMA_VERSION: u32 = 1;

// ─── Artifact ────────────────────────────────────────────────────────

/// 스캔 대상 아티팩트 유형
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// 컨테이너 이미지 (레이어 구조)
    ContainerImage,
    /// 로컬 파일 시스템 트리
    Filesystem,
    /// 소스 저장소 체크아웃
    Repository,
    /// SBOM 문서
    Sbom,
    /// VM 디스크 이미지
    Vm,
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContainerImage => write!(f, "container_image"),
            Self::Filesystem => write!(f, "filesystem"),
            Self::Repository => write!(f, "repository"),
            Self::Sbom => write!(f, "sbom"),
            Self::Vm => write!(f, "vm"),
        }
    }
}

/// 스캔 결과 핸들
///
/// 병합된 결과가 아니라 캐시에 저장된 블롭을 나중에 꺼내기 위한 식별자 묶음입니다.
/// `blob_ids`는 베이스 레이어가 먼저 옵니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactReference {
    /// 아티팩트 ID (`sha256:<hex>`)
    pub id: String,
    /// 아티팩트 유형
    pub artifact_type: ArtifactType,
    /// 사람이 읽는 이름 (경로, 이미지 태그 등)
    pub name: String,
    /// 레이어 순서대로 정렬된 블롭 ID
    pub blob_ids: Vec<String>,
}

// ─── OS / Repository ────────────────────────────────────────────────

/// 탐지된 운영체제
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Os {
    /// OS 계열 (alpine, debian 등)
    pub family: String,
    /// 릴리스 이름/버전
    pub name: String,
}

impl Os {
    /// OS 계열이 채워져 있으면 탐지된 것으로 봅니다.
    pub fn is_detected(&self) -> bool {
        !self.family.is_empty()
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.family, self.name)
    }
}

/// 패키지 저장소 정보 (예: apk repositories)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// 저장소 계열
    pub family: String,
    /// 릴리스
    pub release: String,
}

// ─── Package ─────────────────────────────────────────────────────────

/// 패키지가 처음 등장한 레이어
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diff_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,
}

impl Layer {
    pub fn is_empty(&self) -> bool {
        self.digest.is_empty() && self.diff_id.is_empty() && self.created_by.is_empty()
    }
}

/// 파일 내 위치 (1부터 시작하는 줄 번호)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub start_line: usize,
    pub end_line: usize,
}

/// 설치된 패키지 또는 라이브러리
///
/// `id`는 `name@version` 형식이며 하나의 [`PackageInfo`] 안에서 유일해야 합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub epoch: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub src_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub src_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub src_release: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub src_epoch: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<String>,
    /// 의존하는 패키지 ID 목록 (정렬, 중복 없음)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub indirect: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,
    /// 병합 시 채워지는 출처 레이어
    #[serde(default, skip_serializing_if = "Layer::is_empty")]
    pub layer: Layer,
}

impl Package {
    /// `name@version` 형식의 패키지 ID를 만듭니다.
    pub fn make_id(name: &str, version: &str) -> String {
        format!("{name}@{version}")
    }
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

/// OS 패키지 DB 파일 하나에서 나온 패키지 목록
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub file_path: String,
    pub packages: Vec<Package>,
}

/// 언어 생태계 lockfile 하나에서 나온 라이브러리 목록
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// 생태계 유형 (npm, pnpm, cargo, ...)
    #[serde(rename = "type")]
    pub app_type: String,
    pub file_path: String,
    pub libraries: Vec<Package>,
}

// ─── Findings ────────────────────────────────────────────────────────

/// 설정 오류 탐지 결과 (정책 엔진 출력의 경계 타입)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misconfiguration {
    pub file_type: String,
    pub file_path: String,
    pub failures: Vec<MisconfFinding>,
    #[serde(default, skip_serializing_if = "Layer::is_empty")]
    pub layer: Layer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MisconfFinding {
    pub id: String,
    pub title: String,
    pub severity: String,
    pub message: String,
}

/// 파일 하나에서 발견된 시크릿 목록
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub file_path: String,
    pub findings: Vec<SecretFinding>,
    #[serde(default, skip_serializing_if = "Layer::is_empty")]
    pub layer: Layer,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretFinding {
    pub rule_id: String,
    pub category: String,
    pub severity: String,
    pub title: String,
    pub start_line: usize,
    pub end_line: usize,
    /// 마스킹된 일치 문자열
    #[serde(rename = "match")]
    pub matched: String,
}

/// 파일 하나에서 탐지된 라이선스 목록
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicenseFile {
    /// 탐지 방식 (header 등)
    pub license_type: String,
    pub file_path: String,
    pub findings: Vec<LicenseFinding>,
    #[serde(default, skip_serializing_if = "Layer::is_empty")]
    pub layer: Layer,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicenseFinding {
    pub name: String,
    pub confidence: f64,
}

// ─── Blob ────────────────────────────────────────────────────────────

/// 레이어 하나의 캐시된 분석 결과
///
/// write-once 레코드입니다. `schema_version == 0`은 캐시에 없음을 뜻합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlobInfo {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub digest: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diff_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<Os>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_infos: Vec<PackageInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<Application>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub misconfigurations: Vec<Misconfiguration>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<Secret>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub licenses: Vec<LicenseFile>,
    /// 이 레이어가 통째로 대체한 디렉토리
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opaque_dirs: Vec<String>,
    /// 이 레이어가 삭제한 파일
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub whiteout_files: Vec<String>,
}

impl BlobInfo {
    /// 캐시에 레코드가 있는지 여부
    pub fn is_present(&self) -> bool {
        self.schema_version != 0
    }

    /// 블롭을 만든 레이어 정보
    pub fn layer(&self) -> Layer {
        Layer {
            digest: self.digest.clone(),
            diff_id: self.diff_id.clone(),
            created_by: self.created_by.clone(),
        }
    }
}

// ─── Artifact info / detail ──────────────────────────────────────────

/// 이미지 빌드 히스토리 항목
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_by: String,
    #[serde(default)]
    pub empty_layer: bool,
}

/// 패키지 내용과 무관한 아티팩트 단위 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub docker_version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub os: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history_packages: Vec<Package>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misconfiguration: Option<Misconfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<Secret>,
}

impl ArtifactInfo {
    pub fn is_present(&self) -> bool {
        self.schema_version != 0
    }
}

/// 이미지 설정에서 나온 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageConfigDetail {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<Package>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misconfiguration: Option<Misconfiguration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<Secret>,
}

/// 모든 레이어를 병합한 논리적 뷰
///
/// 캐시되지 않으며 병합할 때마다 새로 만들어집니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDetail {
    pub os: Option<Os>,
    pub repository: Option<Repository>,
    pub packages: Vec<Package>,
    pub applications: Vec<Application>,
    pub misconfigurations: Vec<Misconfiguration>,
    pub secrets: Vec<Secret>,
    pub licenses: Vec<LicenseFile>,
    pub image_config: ImageConfigDetail,
}
