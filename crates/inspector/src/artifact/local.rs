//! 로컬 트리 소스 (파일 시스템, 저장소)
//!
//! 트리 전체를 하나의 가상 레이어로 다룹니다. 레이어 다이제스트는 트리 내용에서 계산하므로
//! 파일이 바뀌지 않으면 같은 블롭 ID가 나와 캐시를 재사용합니다.

use std::path::{Path, PathBuf};

use layerscan_core::types::{ARTIFACT_SCHEMA_VERSION, ArtifactInfo, ArtifactType};

use crate::artifact::{ArtifactPlan, ArtifactSource, LayerContent, LayerPlan, PlanContext};
use crate::cache::key::{calc_key, tree_digest};
use crate::error::InspectorError;

/// 저장소 스캔에서 항상 건너뛰는 디렉토리
const VCS_DIR: &str = ".git";

/// 로컬 디렉토리 아티팩트
#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
    name: String,
    artifact_type: ArtifactType,
}

impl LocalSource {
    /// 파일 시스템 트리
    pub fn filesystem(path: impl AsRef<Path>) -> Self {
        Self::new(path.as_ref(), ArtifactType::Filesystem)
    }

    /// 소스 저장소 체크아웃 (`.git` 제외)
    pub fn repository(path: impl AsRef<Path>) -> Self {
        Self::new(path.as_ref(), ArtifactType::Repository)
    }

    fn new(path: &Path, artifact_type: ArtifactType) -> Self {
        Self {
            root: path.to_path_buf(),
            name: path.display().to_string(),
            artifact_type,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn effective_skip_dirs(&self, ctx: &PlanContext) -> Vec<String> {
        let mut dirs = ctx.skip_dirs.clone();
        if self.artifact_type == ArtifactType::Repository && !dirs.iter().any(|d| d == VCS_DIR) {
            dirs.push(VCS_DIR.to_owned());
        }
        dirs
    }
}

impl ArtifactSource for LocalSource {
    async fn plan(&self, ctx: &PlanContext) -> Result<ArtifactPlan, InspectorError> {
        let skip_dirs = self.effective_skip_dirs(ctx);

        let digest = {
            let root = self.root.clone();
            let skip_files = ctx.skip_files.clone();
            let skip_dirs = skip_dirs.clone();
            tokio::task::spawn_blocking(move || tree_digest(&root, &skip_files, &skip_dirs))
                .await
                .map_err(|e| InspectorError::Task(format!("spawn_blocking failed: {e}")))??
        };

        let blob_id = calc_key(
            &digest,
            &ctx.analyzer_versions,
            &ctx.skip_files,
            &ctx.skip_dirs,
            Some(ctx.max_file_size),
        )?;

        Ok(ArtifactPlan {
            artifact_id: blob_id.clone(),
            artifact_type: self.artifact_type,
            name: self.name.clone(),
            layers: vec![LayerPlan {
                blob_id,
                diff_id: String::new(),
                digest: String::new(),
                created_by: String::new(),
                content: LayerContent::Tree {
                    root: self.root.clone(),
                    whiteouts: false,
                    skip_dirs,
                },
            }],
        })
    }

    fn artifact_info(&self, _ctx: &PlanContext) -> Result<ArtifactInfo, InspectorError> {
        Ok(ArtifactInfo {
            schema_version: ARTIFACT_SCHEMA_VERSION,
            ..Default::default()
        })
    }
}
