//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::histogram!()`
//! 매크로를 호출합니다. 레코더(exporter) 설치는 라이브러리 사용자의 몫입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `layerscan_`
//! - 접미어: `_total` (counter), `_seconds` (histogram)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(layerscan_core::metrics::WALKER_FILES_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 분석기 유형 레이블 키
pub const LABEL_ANALYZER: &str = "analyzer";

/// 아티팩트 유형 레이블 키
pub const LABEL_ARTIFACT_TYPE: &str = "artifact_type";

// ─── Walker ─────────────────────────────────────────────────────────

/// Walker: 처리된 파일 수 (counter)
pub const WALKER_FILES_TOTAL: &str = "layerscan_walker_files_total";

// ─── Analyzer ───────────────────────────────────────────────────────

/// Analyzer: 실패한 분석 수 (counter, label: analyzer)
pub const ANALYZER_ERRORS_TOTAL: &str = "layerscan_analyzer_errors_total";

// ─── Orchestrator ───────────────────────────────────────────────────

/// Orchestrator: 새로 분석한 블롭 수 (counter, label: artifact_type)
pub const BLOBS_ANALYZED_TOTAL: &str = "layerscan_blobs_analyzed_total";

/// Orchestrator: 캐시에서 재사용한 블롭 수 (counter, label: artifact_type)
pub const BLOB_CACHE_HITS_TOTAL: &str = "layerscan_blob_cache_hits_total";

/// Orchestrator: 레이어 하나 분석에 걸린 시간 (histogram, 초)
pub const LAYER_ANALYSIS_DURATION_SECONDS: &str = "layerscan_layer_analysis_duration_seconds";

// ─── Applier ────────────────────────────────────────────────────────

/// Applier: 레이어 병합 횟수 (counter)
pub const APPLY_TOTAL: &str = "layerscan_apply_total";

/// Applier: 소프트 경고가 붙은 병합 횟수 (counter)
pub const APPLY_WARNINGS_TOTAL: &str = "layerscan_apply_warnings_total";

/// 모든 메트릭의 설명을 등록합니다.
///
/// `metrics::describe_counter!()`, `describe_histogram!()`을 호출하여
/// 레코더가 설치된 경우 HELP 텍스트를 노출하게 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    describe_counter!(WALKER_FILES_TOTAL, "Number of regular files processed by the walker");
    describe_counter!(
        ANALYZER_ERRORS_TOTAL,
        "Number of analyzer failures, labeled by analyzer type"
    );
    describe_counter!(
        BLOBS_ANALYZED_TOTAL,
        "Number of layer blobs analyzed because they were missing from the cache"
    );
    describe_counter!(
        BLOB_CACHE_HITS_TOTAL,
        "Number of layer blobs reused from the cache"
    );
    describe_histogram!(
        LAYER_ANALYSIS_DURATION_SECONDS,
        metrics::Unit::Seconds,
        "Time spent walking and analyzing a single layer"
    );
    describe_counter!(APPLY_TOTAL, "Number of layer merges performed");
    describe_counter!(
        APPLY_WARNINGS_TOTAL,
        "Number of layer merges that returned a soft warning"
    );
}
