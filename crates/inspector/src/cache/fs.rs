//! 파일 시스템 캐시 백엔드
//!
//! 레코드 하나가 JSON 파일 하나입니다.
//!
//! ```text
//! <dir>/
//! ├── blob/<hex(key)>.json
//! └── artifact/<hex(key)>.json
//! ```
//!
//! 파일 이름은 키 바이트를 hex로 인코딩한 것이라 서로 다른 키가 같은 파일로 가지 않습니다.
//!
//! 쓰기는 같은 디렉토리의 임시 파일에 쓴 뒤 rename 합니다.
//! 동시에 같은 키를 쓰더라도 읽는 쪽은 완전한 파일만 보게 됩니다.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use layerscan_core::types::{ArtifactInfo, BlobInfo};

use crate::cache::{ArtifactCache, MissingBlobs, is_current_artifact, is_current_blob};
use crate::error::CacheError;

const BLOB_DIR: &str = "blob";
const ARTIFACT_DIR: &str = "artifact";

/// 키 최대 길이. hex 인코딩과 임시 파일 접미사를 붙여도 파일 이름 255바이트를 넘지 않습니다.
const MAX_KEY_LEN: usize = 100;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// 로컬 디렉토리 기반 아티팩트 캐시
pub struct FsCache {
    root: PathBuf,
}

impl FsCache {
    /// 캐시 디렉토리를 열고 필요한 하위 디렉토리를 만듭니다.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let root = dir.as_ref().to_path_buf();
        for sub in [BLOB_DIR, ARTIFACT_DIR] {
            let path = root.join(sub);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| io_error(&path, e))?;
        }
        tracing::debug!(dir = %root.display(), "fs cache opened");
        Ok(Self { root })
    }

    /// 캐시 루트 디렉토리
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, bucket: &str, key: &str) -> Result<PathBuf, CacheError> {
        validate_key(key)?;
        Ok(self.root.join(bucket).join(record_file_name(key)))
    }

    async fn read_record<T: DeserializeOwned + Default>(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<T, CacheError> {
        let path = self.record_path(bucket, key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(io_error(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| CacheError::Decode {
            key: key.to_owned(),
            reason: e.to_string(),
        })
    }

    async fn write_record<T: Serialize>(
        &self,
        bucket: &str,
        key: &str,
        value: &T,
    ) -> Result<(), CacheError> {
        let path = self.record_path(bucket, key)?;
        let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Encode(e.to_string()))?;

        let tmp = path.with_extension(format!(
            "json.{}.{}.tmp",
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(&path, e));
        }
        Ok(())
    }

    /// 레코드를 읽되 손상된 파일은 없는 것으로 봅니다.
    async fn read_or_missing<T: DeserializeOwned + Default>(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<T, CacheError> {
        match self.read_record(bucket, key).await {
            Err(CacheError::Decode { key, reason }) => {
                warn!(key = %key, reason = %reason, "corrupted cache record, treating as missing");
                Ok(T::default())
            }
            other => other,
        }
    }
}

impl ArtifactCache for FsCache {
    async fn missing_blobs(
        &self,
        artifact_id: &str,
        blob_ids: &[String],
    ) -> Result<MissingBlobs, CacheError> {
        let artifact: ArtifactInfo = self.read_or_missing(ARTIFACT_DIR, artifact_id).await?;

        let mut missing_blob_ids = Vec::new();
        for id in blob_ids {
            let blob: BlobInfo = self.read_or_missing(BLOB_DIR, id).await?;
            if !is_current_blob(&blob) {
                missing_blob_ids.push(id.clone());
            }
        }

        Ok(MissingBlobs {
            missing_artifact: !is_current_artifact(&artifact),
            missing_blob_ids,
        })
    }

    async fn put_artifact(&self, artifact_id: &str, info: &ArtifactInfo) -> Result<(), CacheError> {
        self.write_record(ARTIFACT_DIR, artifact_id, info).await
    }

    async fn put_blob(&self, blob_id: &str, blob: &BlobInfo) -> Result<(), CacheError> {
        let existing: BlobInfo = self.read_or_missing(BLOB_DIR, blob_id).await?;
        if is_current_blob(&existing) {
            tracing::trace!(blob_id, "blob already cached");
            return Ok(());
        }
        self.write_record(BLOB_DIR, blob_id, blob).await
    }

    async fn get_artifact(&self, artifact_id: &str) -> Result<ArtifactInfo, CacheError> {
        self.read_record(ARTIFACT_DIR, artifact_id).await
    }

    async fn get_blob(&self, blob_id: &str) -> Result<BlobInfo, CacheError> {
        self.read_record(BLOB_DIR, blob_id).await
    }

    async fn delete_blobs(&self, blob_ids: &[String]) -> Result<(), CacheError> {
        for id in blob_ids {
            let path = self.record_path(BLOB_DIR, id)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(&path, e)),
            }
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        for sub in [BLOB_DIR, ARTIFACT_DIR] {
            let path = self.root.join(sub);
            match tokio::fs::remove_dir_all(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(&path, e)),
            }
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| io_error(&path, e))?;
        }
        tracing::info!(dir = %self.root.display(), "fs cache cleared");
        Ok(())
    }
}

/// 파일 이름으로 안전하게 쓸 수 있는 키인지 검증합니다.
fn validate_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty()
        || key.len() > MAX_KEY_LEN
        || key.contains(['/', '\\', '\0'])
        || key.contains("..")
    {
        return Err(CacheError::InvalidKey(key.to_owned()));
    }
    Ok(())
}

/// 키에 해당하는 레코드 파일 이름
fn record_file_name(key: &str) -> String {
    format!("{}.json", hex::encode(key))
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ArtifactCache;
    use layerscan_core::types::{ARTIFACT_SCHEMA_VERSION, BLOB_SCHEMA_VERSION, Os};

    fn blob(diff_id: &str) -> BlobInfo {
        BlobInfo {
            schema_version: BLOB_SCHEMA_VERSION,
            diff_id: diff_id.to_owned(),
            os: Some(Os {
                family: "alpine".to_owned(),
                name: "3.11.6".to_owned(),
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn open_creates_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path().join("c")).await.unwrap();
        assert!(cache.root().join(BLOB_DIR).is_dir());
        assert!(cache.root().join(ARTIFACT_DIR).is_dir());
    }

    #[tokio::test]
    async fn blob_roundtrip_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = FsCache::open(dir.path()).await.unwrap();
            cache.put_blob("sha256:abc", &blob("sha256:d1")).await.unwrap();
        }
        let cache = FsCache::open(dir.path()).await.unwrap();
        let stored = cache.get_blob("sha256:abc").await.unwrap();
        assert_eq!(stored, blob("sha256:d1"));
        assert!(
            dir.path()
                .join(BLOB_DIR)
                .join(record_file_name("sha256:abc"))
                .is_file()
        );
    }

    #[tokio::test]
    async fn missing_blobs_and_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path()).await.unwrap();
        cache.put_blob("sha256:a", &blob("a")).await.unwrap();

        let ids = vec!["sha256:a".to_owned(), "sha256:b".to_owned()];
        let missing = cache.missing_blobs("sha256:art", &ids).await.unwrap();
        assert!(missing.missing_artifact);
        assert_eq!(missing.missing_blob_ids, vec!["sha256:b"]);

        cache
            .put_artifact(
                "sha256:art",
                &ArtifactInfo {
                    schema_version: ARTIFACT_SCHEMA_VERSION,
                    os: "linux".to_owned(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let missing = cache.missing_blobs("sha256:art", &ids[..1]).await.unwrap();
        assert!(!missing.missing_artifact);
        assert!(missing.missing_blob_ids.is_empty());
    }

    #[tokio::test]
    async fn keys_differing_only_in_separator_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path()).await.unwrap();
        cache.put_blob("sha256:abc", &blob("colon")).await.unwrap();
        cache.put_blob("sha256-abc", &blob("dash")).await.unwrap();

        assert_eq!(cache.get_blob("sha256:abc").await.unwrap().diff_id, "colon");
        assert_eq!(cache.get_blob("sha256-abc").await.unwrap().diff_id, "dash");
        assert_ne!(record_file_name("sha256:abc"), record_file_name("sha256-abc"));
    }

    #[tokio::test]
    async fn put_blob_keeps_existing_record() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path()).await.unwrap();
        cache.put_blob("sha256:a", &blob("first")).await.unwrap();
        cache.put_blob("sha256:a", &blob("second")).await.unwrap();
        assert_eq!(cache.get_blob("sha256:a").await.unwrap().diff_id, "first");
    }

    #[tokio::test]
    async fn corrupted_record_counts_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path()).await.unwrap();
        std::fs::write(
            dir.path().join(BLOB_DIR).join(record_file_name("sha256:bad")),
            "{not json",
        )
        .unwrap();

        let missing = cache
            .missing_blobs("sha256:art", &["sha256:bad".to_owned()])
            .await
            .unwrap();
        assert_eq!(missing.missing_blob_ids, vec!["sha256:bad"]);

        let err = cache.get_blob("sha256:bad").await.unwrap_err();
        assert!(matches!(err, CacheError::Decode { .. }));

        // 손상된 레코드는 다시 쓸 수 있음
        cache.put_blob("sha256:bad", &blob("fixed")).await.unwrap();
        assert_eq!(cache.get_blob("sha256:bad").await.unwrap().diff_id, "fixed");
    }

    #[tokio::test]
    async fn rejects_path_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path()).await.unwrap();
        for key in ["", "../etc/passwd", "a/b", "a\\b"] {
            let err = cache.get_blob(key).await.unwrap_err();
            assert!(matches!(err, CacheError::InvalidKey(_)), "key {key:?}");
        }
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path()).await.unwrap();
        cache.put_blob("sha256:a", &blob("a")).await.unwrap();
        cache.put_blob("sha256:b", &blob("b")).await.unwrap();

        cache
            .delete_blobs(&["sha256:a".to_owned(), "sha256:missing".to_owned()])
            .await
            .unwrap();
        assert!(!cache.get_blob("sha256:a").await.unwrap().is_present());
        assert!(cache.get_blob("sha256:b").await.unwrap().is_present());

        cache.clear().await.unwrap();
        assert!(!cache.get_blob("sha256:b").await.unwrap().is_present());
        assert!(dir.path().join(BLOB_DIR).is_dir());
    }

    #[tokio::test]
    async fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::open(dir.path()).await.unwrap();
        for i in 0..5 {
            cache.put_blob(&format!("sha256:{i}"), &blob("x")).await.unwrap();
        }
        let leftovers = std::fs::read_dir(dir.path().join(BLOB_DIR))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }
}
