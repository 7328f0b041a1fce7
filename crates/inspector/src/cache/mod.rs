//! 내용 주소 캐시
//!
//! [`ArtifactCache`]는 레이어 단위 블롭과 아티팩트 메타데이터를 저장하는 비동기 trait이고,
//! [`DynArtifactCache`]는 런타임에 백엔드를 고를 수 있도록 `BoxFuture`를 반환하는 쌍둥이 trait입니다.
//!
//! # 백엔드
//!
//! - [`MemoryCache`]: 프로세스 내 맵
//! - [`FsCache`]: `<dir>/blob/`, `<dir>/artifact/` 아래 JSON 파일
//! - [`RemoteCache`]: JSON-over-HTTP 클라이언트
//!
//! # 계약
//!
//! - `put_blob`은 write-once입니다. 현재 스키마 버전 레코드가 이미 있으면 아무것도 하지 않습니다.
//! - `get_blob`/`get_artifact`는 레코드가 없으면 `schema_version == 0`인 기본값을 반환합니다.
//! - 스키마 버전이 다른 레코드는 `missing_blobs`에서 누락으로 보고됩니다.
//! - 재시도는 하지 않습니다.

pub mod fs;
pub mod key;
pub mod memory;
pub mod remote;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use layerscan_core::config::{CacheBackend, CacheConfig};
use layerscan_core::pipeline::BoxFuture;
use layerscan_core::types::{ARTIFACT_SCHEMA_VERSION, ArtifactInfo, BLOB_SCHEMA_VERSION, BlobInfo};

use crate::error::{CacheError, InspectorError};

pub use fs::FsCache;
pub use key::calc_key;
pub use memory::MemoryCache;
pub use remote::RemoteCache;

/// `missing_blobs` 결과
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingBlobs {
    /// 아티팩트 레코드가 없는지 여부
    pub missing_artifact: bool,
    /// 캐시에 없는 블롭 ID (입력 순서 유지)
    pub missing_blob_ids: Vec<String>,
}

/// 아티팩트 캐시 trait
///
/// 구현체는 여러 태스크에서 동시에 호출될 수 있어야 합니다.
pub trait ArtifactCache: Send + Sync {
    /// 아티팩트 레코드와 블롭 중 캐시에 없는 것을 찾습니다 (읽기 전용).
    fn missing_blobs(
        &self,
        artifact_id: &str,
        blob_ids: &[String],
    ) -> impl Future<Output = Result<MissingBlobs, CacheError>> + Send;

    /// 아티팩트 메타데이터를 저장합니다.
    fn put_artifact(
        &self,
        artifact_id: &str,
        info: &ArtifactInfo,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// 블롭을 저장합니다 (write-once).
    fn put_blob(
        &self,
        blob_id: &str,
        blob: &BlobInfo,
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// 아티팩트 메타데이터를 읽습니다. 없으면 기본값입니다.
    fn get_artifact(
        &self,
        artifact_id: &str,
    ) -> impl Future<Output = Result<ArtifactInfo, CacheError>> + Send;

    /// 블롭을 읽습니다. 없으면 기본값입니다.
    fn get_blob(&self, blob_id: &str) -> impl Future<Output = Result<BlobInfo, CacheError>> + Send;

    /// 블롭을 삭제합니다. 없는 ID는 무시합니다.
    fn delete_blobs(
        &self,
        blob_ids: &[String],
    ) -> impl Future<Output = Result<(), CacheError>> + Send;

    /// 모든 레코드를 삭제합니다.
    fn clear(&self) -> impl Future<Output = Result<(), CacheError>> + Send;
}

/// dyn-compatible 캐시 trait
///
/// `ArtifactCache`는 RPITIT를 사용하므로 trait 객체로 만들 수 없습니다.
/// `DynArtifactCache`는 `BoxFuture`를 반환하여 `Arc<dyn DynArtifactCache>`로
/// 설정에 따라 고른 백엔드를 보관할 수 있게 합니다.
///
/// `ArtifactCache`를 구현한 모든 타입은 blanket impl으로 자동 구현됩니다.
pub trait DynArtifactCache: Send + Sync {
    fn missing_blobs<'a>(
        &'a self,
        artifact_id: &'a str,
        blob_ids: &'a [String],
    ) -> BoxFuture<'a, Result<MissingBlobs, CacheError>>;

    fn put_artifact<'a>(
        &'a self,
        artifact_id: &'a str,
        info: &'a ArtifactInfo,
    ) -> BoxFuture<'a, Result<(), CacheError>>;

    fn put_blob<'a>(
        &'a self,
        blob_id: &'a str,
        blob: &'a BlobInfo,
    ) -> BoxFuture<'a, Result<(), CacheError>>;

    fn get_artifact<'a>(&'a self, artifact_id: &'a str)
    -> BoxFuture<'a, Result<ArtifactInfo, CacheError>>;

    fn get_blob<'a>(&'a self, blob_id: &'a str) -> BoxFuture<'a, Result<BlobInfo, CacheError>>;

    fn delete_blobs<'a>(&'a self, blob_ids: &'a [String]) -> BoxFuture<'a, Result<(), CacheError>>;

    fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>>;
}

impl<T: ArtifactCache> DynArtifactCache for T {
    fn missing_blobs<'a>(
        &'a self,
        artifact_id: &'a str,
        blob_ids: &'a [String],
    ) -> BoxFuture<'a, Result<MissingBlobs, CacheError>> {
        Box::pin(ArtifactCache::missing_blobs(self, artifact_id, blob_ids))
    }

    fn put_artifact<'a>(
        &'a self,
        artifact_id: &'a str,
        info: &'a ArtifactInfo,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(ArtifactCache::put_artifact(self, artifact_id, info))
    }

    fn put_blob<'a>(
        &'a self,
        blob_id: &'a str,
        blob: &'a BlobInfo,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(ArtifactCache::put_blob(self, blob_id, blob))
    }

    fn get_artifact<'a>(
        &'a self,
        artifact_id: &'a str,
    ) -> BoxFuture<'a, Result<ArtifactInfo, CacheError>> {
        Box::pin(ArtifactCache::get_artifact(self, artifact_id))
    }

    fn get_blob<'a>(&'a self, blob_id: &'a str) -> BoxFuture<'a, Result<BlobInfo, CacheError>> {
        Box::pin(ArtifactCache::get_blob(self, blob_id))
    }

    fn delete_blobs<'a>(&'a self, blob_ids: &'a [String]) -> BoxFuture<'a, Result<(), CacheError>> {
        Box::pin(ArtifactCache::delete_blobs(self, blob_ids))
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), CacheError>> {
        Box::pin(ArtifactCache::clear(self))
    }
}

/// 현재 스키마의 블롭 레코드인지 확인합니다.
pub(crate) fn is_current_blob(blob: &BlobInfo) -> bool {
    blob.schema_version == BLOB_SCHEMA_VERSION
}

/// 현재 스키마의 아티팩트 레코드인지 확인합니다.
pub(crate) fn is_current_artifact(info: &ArtifactInfo) -> bool {
    info.schema_version == ARTIFACT_SCHEMA_VERSION
}

/// 설정에 맞는 캐시 백엔드를 만듭니다.
///
/// # Errors
///
/// - 알 수 없는 백엔드 이름이면 `InspectorError::Config`
/// - 캐시 디렉토리 생성이나 HTTP 클라이언트 생성 실패 시 `InspectorError::Cache`
pub async fn from_config(
    config: &CacheConfig,
) -> Result<Arc<dyn DynArtifactCache>, InspectorError> {
    let Some(backend) = config.backend_kind() else {
        return Err(InspectorError::Config {
            field: "cache.backend".to_owned(),
            reason: format!("unknown backend '{}'", config.backend),
        });
    };

    let cache: Arc<dyn DynArtifactCache> = match backend {
        CacheBackend::Memory => Arc::new(MemoryCache::new()),
        CacheBackend::Fs => Arc::new(FsCache::open(&config.dir).await?),
        CacheBackend::Remote => Arc::new(RemoteCache::new(
            &config.remote_url,
            Duration::from_secs(config.remote_timeout_secs),
        )?),
    };

    tracing::debug!(backend = %config.backend, "cache backend initialized");
    Ok(cache)
}
