//! 검사기 에러 타입
//!
//! [`InspectorError`]는 순회, 분석, 아티팩트 검사, 레이어 병합에서 발생하는 에러이고
//! [`CacheError`]는 캐시 백엔드 에러입니다.
//! `From<...> for LayerscanError` 구현을 통해 `?` 연산자로
//! 상위 에러 타입으로 전파됩니다.
//!
//! # 에러 카테고리
//!
//! - **순회**: `Walk`, `FileOpen`, `Stat`, `OnFile`, `OnResult`, `Cancelled`
//! - **분석**: `Analyzer`
//! - **캐시 연동**: `MissingBlobs`, `PutBlob`, `PutArtifact`, `LayerCacheMissing`, `Cache`
//! - **아티팩트**: `Artifact`, `SbomDecode`
//! - **설정**: `Config`
//! - **기타**: `Io`, `Task`

use layerscan_core::error::{LayerscanError, ScanError, StorageError};

/// 검사기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum InspectorError {
    /// 파일 트리 열거 실패
    #[error("walk error: {path}: {reason}")]
    Walk {
        /// 순회 중이던 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 파일 열기 실패
    #[error("file open error: {path}: {source}")]
    FileOpen {
        path: String,
        source: std::io::Error,
    },

    /// 파일 메타데이터 조회 실패
    #[error("stat error: {path}: {source}")]
    Stat {
        path: String,
        source: std::io::Error,
    },

    /// 파일 처리 콜백 실패
    #[error("on file: {path}: {source}")]
    OnFile {
        path: String,
        #[source]
        source: Box<InspectorError>,
    },

    /// 결과 처리 콜백 실패
    #[error("on result: {0}")]
    OnResult(#[source] Box<InspectorError>),

    /// 분석기 실패
    #[error("analyze error: {analyzer}: unable to parse {path}: {reason}")]
    Analyzer {
        /// 분석기 유형
        analyzer: String,
        /// 분석 대상 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 캐시 누락 블롭 조회 실패
    #[error("MissingBlobs failed: {0}")]
    MissingBlobs(#[source] CacheError),

    /// 블롭 저장 실패
    #[error("failed to store blob: {blob_id}: {source}")]
    PutBlob {
        blob_id: String,
        source: CacheError,
    },

    /// 아티팩트 저장 실패
    #[error("failed to store artifact: {artifact_id}: {source}")]
    PutArtifact {
        artifact_id: String,
        source: CacheError,
    },

    /// 병합 대상 블롭이 캐시에 없음
    #[error("layer cache missing: {0}")]
    LayerCacheMissing(String),

    /// 그 밖의 캐시 에러
    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    /// 아티팩트 구조 에러 (manifest, config 등)
    #[error("artifact error: {0}")]
    Artifact(String),

    /// SBOM 문서 디코딩 실패
    #[error("sbom decode error: {0}")]
    SbomDecode(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 파일 I/O 에러
    #[error("io error: {path}: {source}")]
    Io {
        /// 관련 파일 경로
        path: String,
        /// 원본 I/O 에러
        source: std::io::Error,
    },

    /// 외부 취소 신호로 중단됨
    #[error("cancelled")]
    Cancelled,

    /// 블로킹 태스크 조인 실패
    #[error("task error: {0}")]
    Task(String),
}

/// 캐시 백엔드 에러
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// 로컬 캐시 파일 I/O 실패
    #[error("cache io error: {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// 레코드 직렬화 실패
    #[error("cache encode error: {0}")]
    Encode(String),

    /// 레코드 역직렬화 실패
    #[error("cache decode error: {key}: {reason}")]
    Decode { key: String, reason: String },

    /// 파일 이름으로 쓸 수 없는 키
    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    /// 원격 요청 실패 (연결, 타임아웃)
    #[error("remote cache error: {operation}: {reason}")]
    Remote { operation: String, reason: String },

    /// 원격 서버가 실패 상태 코드를 반환
    #[error("remote cache returned HTTP {status}: {operation}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },
}

impl From<CacheError> for LayerscanError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Decode { key, reason } => LayerscanError::Storage(
                StorageError::Corrupted(format!("{key}: {reason}")),
            ),
            CacheError::InvalidKey(key) => LayerscanError::Storage(StorageError::InvalidKey(key)),
            other => LayerscanError::Storage(StorageError::Backend(other.to_string())),
        }
    }
}

impl From<InspectorError> for LayerscanError {
    fn from(err: InspectorError) -> Self {
        match err {
            InspectorError::Walk { .. }
            | InspectorError::FileOpen { .. }
            | InspectorError::Stat { .. }
            | InspectorError::OnFile { .. }
            | InspectorError::OnResult(_) => {
                LayerscanError::Scan(ScanError::WalkFailed(err.to_string()))
            }
            InspectorError::Analyzer { .. } => {
                LayerscanError::Scan(ScanError::AnalyzerFailed(err.to_string()))
            }
            InspectorError::LayerCacheMissing(_) => {
                LayerscanError::Scan(ScanError::ApplyFailed(err.to_string()))
            }
            InspectorError::Cache(cache) => cache.into(),
            InspectorError::Config { field, reason } => LayerscanError::Config(
                layerscan_core::error::ConfigError::InvalidValue { field, reason },
            ),
            InspectorError::Cancelled => LayerscanError::Scan(ScanError::Cancelled),
            InspectorError::MissingBlobs(_)
            | InspectorError::PutBlob { .. }
            | InspectorError::PutArtifact { .. }
            | InspectorError::Artifact(_)
            | InspectorError::SbomDecode(_)
            | InspectorError::Io { .. }
            | InspectorError::Task(_) => {
                LayerscanError::Scan(ScanError::ArtifactFailed(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_error_display() {
        let err = InspectorError::Walk {
            path: "/nonexistent".to_owned(),
            reason: "No such file or directory".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("walk error"));
        assert!(msg.contains("/nonexistent"));
    }

    #[test]
    fn on_file_error_wraps_inner() {
        let inner = InspectorError::Analyzer {
            analyzer: "npm".to_owned(),
            path: "app/package-lock.json".to_owned(),
            reason: "expected value at line 1".to_owned(),
        };
        let err = InspectorError::OnFile {
            path: "app/package-lock.json".to_owned(),
            source: Box::new(inner),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("on file"));
        assert!(msg.contains("unable to parse app/package-lock.json"));
    }

    #[test]
    fn put_blob_error_display() {
        let err = InspectorError::PutBlob {
            blob_id: "sha256:abc".to_owned(),
            source: CacheError::Remote {
                operation: "PutBlob".to_owned(),
                reason: "connection refused".to_owned(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("failed to store blob"));
        assert!(msg.contains("sha256:abc"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn missing_blobs_error_display() {
        let err = InspectorError::MissingBlobs(CacheError::InvalidKey("../x".to_owned()));
        assert!(err.to_string().contains("MissingBlobs failed"));
    }

    #[test]
    fn layer_cache_missing_display() {
        let err = InspectorError::LayerCacheMissing("sha256:dead".to_owned());
        assert_eq!(err.to_string(), "layer cache missing: sha256:dead");
    }

    #[test]
    fn status_error_display() {
        let err = CacheError::Status {
            operation: "PutArtifact".to_owned(),
            status: 503,
            body: "unavailable".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("503"));
        assert!(msg.contains("PutArtifact"));
    }

    #[test]
    fn converts_walk_error_to_scan_error() {
        let err = InspectorError::Stat {
            path: "a".to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        let top: LayerscanError = err.into();
        assert!(matches!(top, LayerscanError::Scan(ScanError::WalkFailed(_))));
    }

    #[test]
    fn converts_cancelled() {
        let top: LayerscanError = InspectorError::Cancelled.into();
        assert!(matches!(top, LayerscanError::Scan(ScanError::Cancelled)));
    }

    #[test]
    fn converts_cache_decode_to_corrupted() {
        let err = CacheError::Decode {
            key: "sha256:abc".to_owned(),
            reason: "EOF".to_owned(),
        };
        let top: LayerscanError = err.into();
        assert!(matches!(
            top,
            LayerscanError::Storage(StorageError::Corrupted(_))
        ));
    }

    #[test]
    fn converts_config_error() {
        let err = InspectorError::Config {
            field: "parallel".to_owned(),
            reason: "must be greater than 0".to_owned(),
        };
        let top: LayerscanError = err.into();
        assert!(matches!(top, LayerscanError::Config(_)));
    }

    #[test]
    fn converts_put_blob_to_artifact_failed() {
        let err = InspectorError::PutBlob {
            blob_id: "sha256:1".to_owned(),
            source: CacheError::Encode("bad".to_owned()),
        };
        let top: LayerscanError = err.into();
        assert!(matches!(
            top,
            LayerscanError::Scan(ScanError::ArtifactFailed(_))
        ));
    }
}
