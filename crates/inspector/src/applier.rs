//! 레이어 병합
//!
//! [`Applier`]는 캐시에 저장된 블롭을 베이스 레이어부터 순서대로 접어서
//! 아티팩트 전체의 논리적 뷰([`ArtifactDetail`])를 만듭니다.
//!
//! # 병합 규칙
//!
//! 각 블롭에 대해 순서대로:
//!
//! 1. `opaque_dirs`, `whiteout_files` 아래의 패키지 DB와 애플리케이션을 제거
//! 2. 이 블롭의 패키지 DB와 애플리케이션을 추가 (같은 파일 경로면 교체)
//! 3. OS, Repository는 아직 없을 때만 채택
//! 4. 설정 오류, 시크릿, 라이선스는 그대로 추가
//!
//! 경로 비교는 세그먼트 단위이고 끝의 `/`는 무시합니다.
//! 패키지는 처음 등장한 레이어를 기록하며 ID로 중복을 제거합니다.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use layerscan_core::metrics as m;
use layerscan_core::types::{
    Application, ArtifactDetail, BlobInfo, ImageConfigDetail, Layer, LicenseFile,
    Misconfiguration, Os, Package, Repository, Secret,
};

use crate::cache::DynArtifactCache;
use crate::cache::key::is_under;
use crate::error::InspectorError;

/// 병합 결과와 함께 반환되는 경고
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyWarning {
    /// OS도 패키지도 찾지 못함
    UnknownOs,
    /// OS는 찾았지만 OS 패키지가 없음
    NoPackagesDetected,
}

impl fmt::Display for ApplyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownOs => write!(f, "unknown OS"),
            Self::NoPackagesDetected => write!(f, "no packages detected"),
        }
    }
}

/// 병합 결과
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyOutcome {
    pub detail: ArtifactDetail,
    pub warning: Option<ApplyWarning>,
}

/// 레이어 병합기
#[derive(Clone)]
pub struct Applier {
    cache: Arc<dyn DynArtifactCache>,
}

impl Applier {
    pub fn new(cache: Arc<dyn DynArtifactCache>) -> Self {
        Self { cache }
    }

    /// 블롭을 순서대로 병합합니다.
    ///
    /// 아티팩트 메타데이터 조회 실패는 무시하고 이미지 설정 결과를 비워 둡니다.
    ///
    /// # Errors
    ///
    /// - 블롭이 캐시에 없으면 `layer cache missing: <id>`
    /// - 블롭 조회 실패 시 캐시 에러
    pub async fn apply_layers(
        &self,
        artifact_id: &str,
        blob_ids: &[String],
    ) -> Result<ApplyOutcome, InspectorError> {
        let mut blobs = Vec::with_capacity(blob_ids.len());
        for id in blob_ids {
            let blob = self.cache.get_blob(id).await?;
            if !blob.is_present() {
                return Err(InspectorError::LayerCacheMissing(id.clone()));
            }
            blobs.push(blob);
        }

        let mut detail = merge_layers(&blobs);

        match self.cache.get_artifact(artifact_id).await {
            Ok(info) => {
                detail.image_config = ImageConfigDetail {
                    packages: info.history_packages,
                    misconfiguration: info.misconfiguration,
                    secret: info.secret,
                };
            }
            Err(e) => {
                debug!(
                    artifact_id,
                    error = %e,
                    "artifact metadata unavailable, skipping image config"
                );
            }
        }

        let warning = classify(&detail);
        metrics::counter!(m::APPLY_TOTAL).increment(1);
        if let Some(w) = warning {
            metrics::counter!(m::APPLY_WARNINGS_TOTAL).increment(1);
            debug!(artifact_id, warning = %w, "apply finished with warning");
        }

        Ok(ApplyOutcome { detail, warning })
    }
}

fn classify(detail: &ArtifactDetail) -> Option<ApplyWarning> {
    let os_detected = detail.os.as_ref().is_some_and(Os::is_detected);
    if !os_detected {
        if detail.packages.is_empty() && detail.applications.is_empty() {
            return Some(ApplyWarning::UnknownOs);
        }
        return None;
    }
    if detail.packages.is_empty() {
        return Some(ApplyWarning::NoPackagesDetected);
    }
    None
}

// ─── Merge ──────────────────────────────────────────────────────────

#[derive(Default)]
struct MergeState {
    os: Option<Os>,
    repository: Option<Repository>,
    /// 파일 경로 -> 패키지
    package_infos: BTreeMap<String, Vec<Package>>,
    /// (유형, 파일 경로) -> 애플리케이션
    applications: BTreeMap<(String, String), Application>,
    misconfigurations: Vec<Misconfiguration>,
    secrets: Vec<Secret>,
    licenses: Vec<LicenseFile>,
}

impl MergeState {
    fn remove_under(&mut self, dir: &str) {
        self.package_infos.retain(|path, _| !is_under(path, dir));
        self.applications.retain(|(_, path), _| !is_under(path, dir));
    }

    fn apply(&mut self, blob: &BlobInfo) {
        for dir in blob.opaque_dirs.iter().chain(&blob.whiteout_files) {
            self.remove_under(dir);
        }

        let layer = blob.layer();

        for info in &blob.package_infos {
            let previous = self.package_infos.remove(&info.file_path);
            let packages = attribute(&info.packages, previous.as_deref(), &layer);
            self.package_infos.insert(info.file_path.clone(), packages);
        }

        for app in &blob.applications {
            let key = (app.app_type.clone(), app.file_path.clone());
            let previous = self.applications.remove(&key);
            let libraries = attribute(
                &app.libraries,
                previous.as_ref().map(|a| a.libraries.as_slice()),
                &layer,
            );
            self.applications.insert(
                key,
                Application {
                    app_type: app.app_type.clone(),
                    file_path: app.file_path.clone(),
                    libraries,
                },
            );
        }

        if self.os.is_none() {
            self.os = blob.os.clone().filter(Os::is_detected);
        }
        if self.repository.is_none() {
            self.repository = blob.repository.clone();
        }

        self.misconfigurations
            .extend(blob.misconfigurations.iter().cloned().map(|mut m| {
                m.layer = layer.clone();
                m
            }));
        self.secrets.extend(blob.secrets.iter().cloned().map(|mut s| {
            s.layer = layer.clone();
            s
        }));
        self.licenses.extend(blob.licenses.iter().cloned().map(|mut l| {
            l.layer = layer.clone();
            l
        }));
    }

    fn finish(self) -> ArtifactDetail {
        // 패키지 ID 기준 중복 제거 (경로 순으로 먼저 나온 것 유지)
        let mut by_id: BTreeMap<String, Package> = BTreeMap::new();
        for packages in self.package_infos.into_values() {
            for pkg in packages {
                by_id.entry(pkg.id.clone()).or_insert(pkg);
            }
        }
        let mut packages: Vec<Package> = by_id.into_values().collect();
        packages.sort_by(|a, b| (&a.name, &a.version, &a.id).cmp(&(&b.name, &b.version, &b.id)));

        let applications = self
            .applications
            .into_values()
            .map(|mut app| {
                app.libraries
                    .sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
                app
            })
            .collect();

        let mut misconfigurations = self.misconfigurations;
        misconfigurations.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        let mut secrets = self.secrets;
        secrets.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        let mut licenses = self.licenses;
        licenses.sort_by(|a, b| a.file_path.cmp(&b.file_path));

        ArtifactDetail {
            os: self.os,
            repository: self.repository,
            packages,
            applications,
            misconfigurations,
            secrets,
            licenses,
            image_config: ImageConfigDetail::default(),
        }
    }
}

/// 새 패키지 목록에 출처 레이어를 기록합니다.
///
/// 같은 경로의 이전 항목에 이미 있던 패키지는 이전 레이어를 유지합니다.
fn attribute(packages: &[Package], previous: Option<&[Package]>, layer: &Layer) -> Vec<Package> {
    let earlier: HashMap<&str, &Layer> = previous
        .unwrap_or_default()
        .iter()
        .map(|p| (p.id.as_str(), &p.layer))
        .collect();

    packages
        .iter()
        .cloned()
        .map(|mut pkg| {
            if let Some(first) = earlier.get(pkg.id.as_str()) {
                pkg.layer = (*first).clone();
            } else if pkg.layer.is_empty() {
                pkg.layer = layer.clone();
            }
            pkg
        })
        .collect()
}

/// 블롭 목록(베이스 레이어 먼저)을 하나의 뷰로 병합합니다.
pub fn merge_layers(blobs: &[BlobInfo]) -> ArtifactDetail {
    let mut state = MergeState::default();
    for blob in blobs {
        state.apply(blob);
    }
    state.finish()
}
