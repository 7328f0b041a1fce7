//! 아티팩트 검사 오케스트레이션
//!
//! [`Inspector`]는 아티팩트 하나를 다음 순서로 처리합니다.
//!
//! 1. [`ArtifactSource::plan`]으로 블롭 ID 순서와 아티팩트 ID를 계산
//! 2. 캐시에 `missing_blobs` 질의
//! 3. 누락된 레이어만 순회/분석하여 블롭을 만들고 `put_blob`
//! 4. 아티팩트 레코드가 없으면 `put_artifact`
//! 5. [`ArtifactReference`] 반환
//!
//! 레이어 분석이 실패하면 참조를 반환하지 않습니다. 이미 저장한 블롭은 그대로 남습니다.
//!
//! # 소스
//!
//! - [`LocalSource`]: 파일 시스템 트리, 저장소 체크아웃 (단일 레이어)
//! - [`ImageSource`]: 압축 해제된 이미지 디렉토리 (레이어 구조)
//! - [`SbomSource`]: CycloneDX JSON 문서 (트리 없음)

pub mod image;
pub mod local;
pub mod sbom;

use std::collections::BTreeMap;
use std::fs::File;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use layerscan_core::metrics as m;
use layerscan_core::types::{
    ArtifactInfo, ArtifactReference, ArtifactType, BLOB_SCHEMA_VERSION, BlobInfo,
};

use crate::analyzer::{AnalysisResult, AnalyzerGroup, AnalyzerRegistry};
use crate::cache::DynArtifactCache;
use crate::config::InspectorConfig;
use crate::error::InspectorError;
use crate::walker::{FileInfo, WalkOptions, walk_dir};

pub use image::ImageSource;
pub use local::LocalSource;
pub use sbom::SbomSource;

/// 디렉토리 전체를 대체하는 whiteout 파일 이름
const OPAQUE_MARKER: &str = ".wh..wh..opq";
/// 삭제된 파일을 표시하는 whiteout 접두사
const WHITEOUT_PREFIX: &str = ".wh.";

// ─── Plan ───────────────────────────────────────────────────────────

/// 키 계산에 필요한 스캔 단위 입력
#[derive(Debug, Clone)]
pub struct PlanContext {
    /// 활성 분석기 버전 (`{유형 -> 버전}`)
    pub analyzer_versions: BTreeMap<String, u32>,
    pub skip_files: Vec<String>,
    pub skip_dirs: Vec<String>,
    /// 이보다 큰 파일은 분석하지 않으므로 키에 포함합니다.
    pub max_file_size: u64,
}

/// 레이어 내용
#[derive(Debug, Clone)]
pub enum LayerContent {
    /// 순회할 디렉토리
    Tree {
        root: PathBuf,
        /// whiteout 파일을 해석할지 여부 (이미지 레이어)
        whiteouts: bool,
        /// 이 레이어에 적용할 스킵 디렉토리
        skip_dirs: Vec<String>,
    },
    /// 이미 분석된 블롭 (SBOM 등)
    Decoded(Box<BlobInfo>),
}

/// 레이어 하나의 처리 계획
#[derive(Debug, Clone)]
pub struct LayerPlan {
    pub blob_id: String,
    pub diff_id: String,
    pub digest: String,
    pub created_by: String,
    pub content: LayerContent,
}

/// 아티팩트 처리 계획
#[derive(Debug, Clone)]
pub struct ArtifactPlan {
    pub artifact_id: String,
    pub artifact_type: ArtifactType,
    pub name: String,
    /// 베이스 레이어 먼저
    pub layers: Vec<LayerPlan>,
}

impl ArtifactPlan {
    pub fn blob_ids(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.blob_id.clone()).collect()
    }
}

/// 검사 대상 아티팩트
pub trait ArtifactSource: Send + Sync {
    /// 레이어 계획과 ID를 계산합니다.
    fn plan(
        &self,
        ctx: &PlanContext,
    ) -> impl Future<Output = Result<ArtifactPlan, InspectorError>> + Send;

    /// 레이어와 무관한 아티팩트 메타데이터
    ///
    /// `ctx`의 활성 분석기 목록을 보고 꺼진 분석기의 결과는 만들지 않습니다.
    fn artifact_info(&self, ctx: &PlanContext) -> Result<ArtifactInfo, InspectorError>;
}

// ─── Inspector ──────────────────────────────────────────────────────

/// 아티팩트 검사기
#[derive(Clone)]
pub struct Inspector {
    cache: Arc<dyn DynArtifactCache>,
    analyzers: AnalyzerGroup,
    config: InspectorConfig,
}

/// 레이어 순회 중 워커가 넘기는 항목
enum LayerItem {
    Analysis(AnalysisResult),
    OpaqueDir(String),
    WhiteoutFile(String),
}

impl Inspector {
    /// 검사기를 만듭니다.
    ///
    /// # Errors
    ///
    /// 설정 검증 실패 시 `InspectorError::Config`
    pub fn new(
        cache: Arc<dyn DynArtifactCache>,
        registry: &AnalyzerRegistry,
        config: InspectorConfig,
    ) -> Result<Self, InspectorError> {
        config.validate()?;
        let analyzers = registry.group(&config.disabled_analyzers);
        Ok(Self {
            cache,
            analyzers,
            config,
        })
    }

    pub fn config(&self) -> &InspectorConfig {
        &self.config
    }

    pub fn analyzers(&self) -> &AnalyzerGroup {
        &self.analyzers
    }

    /// 키 계산용 컨텍스트
    pub fn plan_context(&self) -> PlanContext {
        PlanContext {
            analyzer_versions: self.analyzers.versions(),
            skip_files: self.config.skip_files.clone(),
            skip_dirs: self.config.skip_dirs.clone(),
            max_file_size: self.config.max_file_size,
        }
    }

    /// 아티팩트를 검사하고 캐시를 채운 뒤 참조를 반환합니다.
    ///
    /// # Errors
    ///
    /// - `MissingBlobs failed`: 캐시 질의 실패
    /// - `failed to store blob` / `failed to store artifact`: 캐시 쓰기 실패
    /// - 레이어 순회/분석 에러
    /// - 취소 시 [`InspectorError::Cancelled`]
    pub async fn inspect<S: ArtifactSource>(
        &self,
        source: &S,
        cancel: &CancellationToken,
    ) -> Result<ArtifactReference, InspectorError> {
        let ctx = self.plan_context();
        let plan = source.plan(&ctx).await?;
        let blob_ids = plan.blob_ids();
        let type_label = plan.artifact_type.to_string();

        let missing = self
            .cache
            .missing_blobs(&plan.artifact_id, &blob_ids)
            .await
            .map_err(InspectorError::MissingBlobs)?;

        // 응답에 섞인 중복 ID나 요청하지 않은 ID는 세지 않습니다.
        let hits = blob_ids
            .iter()
            .filter(|id| !missing.missing_blob_ids.contains(id))
            .count();
        metrics::counter!(m::BLOB_CACHE_HITS_TOTAL, m::LABEL_ARTIFACT_TYPE => type_label.clone())
            .increment(hits as u64);
        debug!(
            artifact_id = %plan.artifact_id,
            layers = blob_ids.len(),
            missing = missing.missing_blob_ids.len(),
            missing_artifact = missing.missing_artifact,
            "cache lookup complete"
        );

        for layer in &plan.layers {
            if !missing.missing_blob_ids.contains(&layer.blob_id) {
                continue;
            }
            if cancel.is_cancelled() {
                return Err(InspectorError::Cancelled);
            }

            let blob = self.analyze_layer(layer, cancel).await?;
            self.cache
                .put_blob(&layer.blob_id, &blob)
                .await
                .map_err(|source| InspectorError::PutBlob {
                    blob_id: layer.blob_id.clone(),
                    source,
                })?;
            metrics::counter!(m::BLOBS_ANALYZED_TOTAL, m::LABEL_ARTIFACT_TYPE => type_label.clone())
                .increment(1);
        }

        if missing.missing_artifact {
            let info = source.artifact_info(&ctx)?;
            self.cache
                .put_artifact(&plan.artifact_id, &info)
                .await
                .map_err(|source| InspectorError::PutArtifact {
                    artifact_id: plan.artifact_id.clone(),
                    source,
                })?;
        }

        info!(
            artifact = %plan.name,
            artifact_type = %plan.artifact_type,
            artifact_id = %plan.artifact_id,
            "artifact inspected"
        );

        Ok(ArtifactReference {
            id: plan.artifact_id,
            artifact_type: plan.artifact_type,
            name: plan.name,
            blob_ids,
        })
    }

    /// 참조가 가리키는 블롭을 캐시에서 지웁니다.
    pub async fn clean(&self, reference: &ArtifactReference) -> Result<(), InspectorError> {
        self.cache.delete_blobs(&reference.blob_ids).await?;
        debug!(
            artifact_id = %reference.id,
            blobs = reference.blob_ids.len(),
            "artifact blobs removed"
        );
        Ok(())
    }

    /// 레이어 하나를 분석해 블롭을 만듭니다.
    async fn analyze_layer(
        &self,
        layer: &LayerPlan,
        cancel: &CancellationToken,
    ) -> Result<BlobInfo, InspectorError> {
        let started = Instant::now();

        let mut blob = match &layer.content {
            LayerContent::Decoded(blob) => BlobInfo {
                schema_version: BLOB_SCHEMA_VERSION,
                ..(**blob).clone()
            },
            LayerContent::Tree {
                root,
                whiteouts,
                skip_dirs,
            } => {
                let opts = WalkOptions {
                    concurrency: self.config.effective_parallel(),
                    skip_files: self.config.skip_files.clone(),
                    skip_dirs: skip_dirs.clone(),
                };
                self.walk_layer(root, &opts, *whiteouts, cancel).await?
            }
        };
        blob.digest = layer.digest.clone();
        blob.diff_id = layer.diff_id.clone();
        blob.created_by = layer.created_by.clone();

        metrics::histogram!(m::LAYER_ANALYSIS_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        debug!(
            blob_id = %layer.blob_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "layer analyzed"
        );
        Ok(blob)
    }

    async fn walk_layer(
        &self,
        root: &std::path::Path,
        opts: &WalkOptions,
        whiteouts: bool,
        cancel: &CancellationToken,
    ) -> Result<BlobInfo, InspectorError> {
        let analyzers = self.analyzers.clone();
        let max_file_size = self.config.max_file_size;

        let on_file = move |path: &str,
                            info: &FileInfo,
                            file: &mut File|
              -> Result<Option<LayerItem>, InspectorError> {
            if whiteouts {
                if let Some(item) = whiteout_item(path) {
                    return Ok(Some(item));
                }
            }
            if info.size > max_file_size {
                trace!(path = %path, size = info.size, "file too large, skipping analysis");
                return Ok(None);
            }
            Ok(analyzers
                .analyze_file(path, info, file)?
                .map(LayerItem::Analysis))
        };

        let mut result = AnalysisResult::default();
        let mut opaque_dirs = Vec::new();
        let mut whiteout_files = Vec::new();
        walk_dir(root, opts, cancel, on_file, |item| {
            match item {
                LayerItem::Analysis(r) => result.merge(r),
                LayerItem::OpaqueDir(dir) => opaque_dirs.push(dir),
                LayerItem::WhiteoutFile(file) => whiteout_files.push(file),
            }
            Ok(())
        })
        .await?;

        opaque_dirs.sort();
        opaque_dirs.dedup();
        whiteout_files.sort();
        whiteout_files.dedup();

        let mut blob = result.into_blob();
        blob.opaque_dirs = opaque_dirs;
        blob.whiteout_files = whiteout_files;
        Ok(blob)
    }
}

/// whiteout 파일이면 해당 항목을 반환합니다.
///
/// - `D/.wh..wh..opq` -> opaque dir `D/`
/// - `D/.wh.name` -> whiteout file `D/name`
fn whiteout_item(path: &str) -> Option<LayerItem> {
    let (dir, name) = match path.rsplit_once('/') {
        Some((dir, name)) => (dir, name),
        None => ("", path),
    };

    if name == OPAQUE_MARKER {
        return Some(LayerItem::OpaqueDir(format!("{dir}/")));
    }
    let target = name.strip_prefix(WHITEOUT_PREFIX)?;
    if target.is_empty() {
        return None;
    }
    Some(LayerItem::WhiteoutFile(if dir.is_empty() {
        target.to_owned()
    } else {
        format!("{dir}/{target}")
    }))
}
