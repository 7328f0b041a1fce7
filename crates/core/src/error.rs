//! 에러 타입: 도메인별 에러 정의

/// layerscan 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LayerscanError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 아티팩트 스캔 에러
    #[error("scan error: {0}")]
    Scan(#[from] ScanError),

    /// 캐시 저장소 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 아티팩트 스캔 에러
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// 파일 트리 순회 실패
    #[error("walk failed: {0}")]
    WalkFailed(String),

    /// 분석기 실행 실패
    #[error("analyzer failed: {0}")]
    AnalyzerFailed(String),

    /// 아티팩트 검사 실패
    #[error("artifact inspection failed: {0}")]
    ArtifactFailed(String),

    /// 레이어 병합 실패
    #[error("apply layers failed: {0}")]
    ApplyFailed(String),

    /// 취소됨
    #[error("scan cancelled")]
    Cancelled,
}

/// 캐시 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 백엔드 접근 실패 (파일 시스템, 원격 서버)
    #[error("backend unavailable: {0}")]
    Backend(String),

    /// 저장된 레코드 손상
    #[error("corrupted record: {0}")]
    Corrupted(String),

    /// 잘못된 캐시 키
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_layerscan_error() {
        let err: LayerscanError = ConfigError::InvalidValue {
            field: "scan.parallel".to_owned(),
            reason: "must be 1-256".to_owned(),
        }
        .into();
        assert!(matches!(err, LayerscanError::Config(_)));
        assert!(err.to_string().contains("scan.parallel"));
    }

    #[test]
    fn scan_error_display() {
        let err = ScanError::WalkFailed("walk error: /nonexistent".to_owned());
        assert!(err.to_string().contains("/nonexistent"));
        assert_eq!(ScanError::Cancelled.to_string(), "scan cancelled");
    }

    #[test]
    fn storage_error_display() {
        let err: LayerscanError = StorageError::Backend("connection refused".to_owned()).into();
        assert!(err.to_string().starts_with("storage error"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: LayerscanError = io.into();
        assert!(matches!(err, LayerscanError::Io(_)));
    }
}
