//! 메모리 캐시 백엔드
//!
//! 프로세스 수명 동안만 유지됩니다. 테스트와 일회성 스캔에 사용합니다.

use std::collections::HashMap;

use tokio::sync::RwLock;

use layerscan_core::types::{ArtifactInfo, BlobInfo};

use crate::cache::{ArtifactCache, MissingBlobs, is_current_artifact, is_current_blob};
use crate::error::CacheError;

/// 인메모리 아티팩트 캐시
#[derive(Default)]
pub struct MemoryCache {
    blobs: RwLock<HashMap<String, BlobInfo>>,
    artifacts: RwLock<HashMap<String, ArtifactInfo>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 저장된 블롭 수
    pub async fn blob_count(&self) -> usize {
        self.blobs.read().await.len()
    }
}

impl ArtifactCache for MemoryCache {
    async fn missing_blobs(
        &self,
        artifact_id: &str,
        blob_ids: &[String],
    ) -> Result<MissingBlobs, CacheError> {
        let missing_artifact = !self
            .artifacts
            .read()
            .await
            .get(artifact_id)
            .is_some_and(is_current_artifact);

        let blobs = self.blobs.read().await;
        let missing_blob_ids = blob_ids
            .iter()
            .filter(|id| !blobs.get(id.as_str()).is_some_and(is_current_blob))
            .cloned()
            .collect();

        Ok(MissingBlobs {
            missing_artifact,
            missing_blob_ids,
        })
    }

    async fn put_artifact(&self, artifact_id: &str, info: &ArtifactInfo) -> Result<(), CacheError> {
        self.artifacts
            .write()
            .await
            .insert(artifact_id.to_owned(), info.clone());
        Ok(())
    }

    async fn put_blob(&self, blob_id: &str, blob: &BlobInfo) -> Result<(), CacheError> {
        let mut blobs = self.blobs.write().await;
        if blobs.get(blob_id).is_some_and(is_current_blob) {
            tracing::trace!(blob_id, "blob already cached");
            return Ok(());
        }
        blobs.insert(blob_id.to_owned(), blob.clone());
        Ok(())
    }

    async fn get_artifact(&self, artifact_id: &str) -> Result<ArtifactInfo, CacheError> {
        Ok(self
            .artifacts
            .read()
            .await
            .get(artifact_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_blob(&self, blob_id: &str) -> Result<BlobInfo, CacheError> {
        Ok(self
            .blobs
            .read()
            .await
            .get(blob_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete_blobs(&self, blob_ids: &[String]) -> Result<(), CacheError> {
        let mut blobs = self.blobs.write().await;
        for id in blob_ids {
            blobs.remove(id);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.blobs.write().await.clear();
        self.artifacts.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ArtifactCache;
    use layerscan_core::types::{ARTIFACT_SCHEMA_VERSION, BLOB_SCHEMA_VERSION};

    fn blob(diff_id: &str) -> BlobInfo {
        BlobInfo {
            schema_version: BLOB_SCHEMA_VERSION,
            diff_id: diff_id.to_owned(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn missing_blobs_reports_absent_records() {
        let cache = MemoryCache::new();
        cache.put_blob("sha256:a", &blob("a")).await.unwrap();

        let ids = vec!["sha256:a".to_owned(), "sha256:b".to_owned()];
        let missing = cache.missing_blobs("sha256:art", &ids).await.unwrap();
        assert!(missing.missing_artifact);
        assert_eq!(missing.missing_blob_ids, vec!["sha256:b"]);

        cache.put_blob("sha256:b", &blob("b")).await.unwrap();
        cache
            .put_artifact(
                "sha256:art",
                &ArtifactInfo {
                    schema_version: ARTIFACT_SCHEMA_VERSION,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let missing = cache.missing_blobs("sha256:art", &ids).await.unwrap();
        assert!(!missing.missing_artifact);
        assert!(missing.missing_blob_ids.is_empty());
    }

    #[tokio::test]
    async fn stale_schema_counts_as_missing() {
        let cache = MemoryCache::new();
        let stale = BlobInfo {
            schema_version: BLOB_SCHEMA_VERSION - 1,
            ..Default::default()
        };
        cache.put_blob("sha256:old", &stale).await.unwrap();
        let missing = cache
            .missing_blobs("sha256:art", &["sha256:old".to_owned()])
            .await
            .unwrap();
        assert_eq!(missing.missing_blob_ids, vec!["sha256:old"]);

        // 오래된 레코드는 덮어쓸 수 있음
        cache.put_blob("sha256:old", &blob("new")).await.unwrap();
        assert_eq!(cache.get_blob("sha256:old").await.unwrap().diff_id, "new");
    }

    #[tokio::test]
    async fn put_blob_is_write_once() {
        let cache = MemoryCache::new();
        cache.put_blob("sha256:a", &blob("first")).await.unwrap();
        cache.put_blob("sha256:a", &blob("second")).await.unwrap();
        assert_eq!(cache.get_blob("sha256:a").await.unwrap().diff_id, "first");
    }

    #[tokio::test]
    async fn get_absent_returns_default() {
        let cache = MemoryCache::new();
        assert!(!cache.get_blob("sha256:none").await.unwrap().is_present());
        assert!(!cache.get_artifact("sha256:none").await.unwrap().is_present());
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let cache = MemoryCache::new();
        cache.put_blob("sha256:a", &blob("a")).await.unwrap();
        cache.put_blob("sha256:b", &blob("b")).await.unwrap();

        cache
            .delete_blobs(&["sha256:a".to_owned(), "sha256:zzz".to_owned()])
            .await
            .unwrap();
        assert_eq!(cache.blob_count().await, 1);

        cache.clear().await.unwrap();
        assert_eq!(cache.blob_count().await, 0);
    }
}
