//! 아티팩트 검사 통합 테스트
//!
//! 소스 계획 -> 누락 블롭 분석 -> 캐시 저장 -> 레이어 병합까지 전체 흐름을 검증합니다.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use layerscan_core::types::{ArtifactInfo, BlobInfo};
use layerscan_inspector::cache::MissingBlobs;
use layerscan_inspector::{
    Applier, AnalyzerRegistry, AnalyzerType, ArtifactCache, CacheError, ImageSource, Inspector,
    InspectorConfig, InspectorConfigBuilder, LocalSource, MemoryCache, SbomSource,
};
use tokio_util::sync::CancellationToken;

const APK_INSTALLED: &str = "\
C:Q1B8hNfsJ0eNqkvJx8b8ZlbsCv0sw=
P:musl
V:1.1.24-r2
A:x86_64
S:377765
I:614400
T:the musl c library (libc) implementation
U:https://musl.libc.org/
L:MIT
o:musl
m:Timo Teras <timo.teras@iki.fi>
t:1584790550

";

/// 호출 횟수를 세고 실패를 주입할 수 있는 캐시
#[derive(Default)]
struct CountingCache {
    inner: MemoryCache,
    put_blobs: AtomicUsize,
    put_artifacts: AtomicUsize,
    last_missing: Mutex<Option<MissingBlobs>>,
    noisy_missing: bool,
    fail_missing: bool,
    fail_put_blob: bool,
    fail_put_artifact: bool,
}

fn injected(operation: &str) -> CacheError {
    CacheError::Remote {
        operation: operation.to_owned(),
        reason: "injected failure".to_owned(),
    }
}

impl ArtifactCache for CountingCache {
    async fn missing_blobs(
        &self,
        artifact_id: &str,
        blob_ids: &[String],
    ) -> Result<MissingBlobs, CacheError> {
        if self.fail_missing {
            return Err(injected("MissingBlobs"));
        }
        let mut missing = self.inner.missing_blobs(artifact_id, blob_ids).await?;
        if self.noisy_missing {
            let extra = missing.missing_blob_ids.clone();
            missing.missing_blob_ids.extend(extra);
            missing.missing_blob_ids.push("sha256:unknown-1".to_owned());
            missing.missing_blob_ids.push("sha256:unknown-2".to_owned());
        }
        *self.last_missing.lock().unwrap() = Some(missing.clone());
        Ok(missing)
    }

    async fn put_artifact(&self, artifact_id: &str, info: &ArtifactInfo) -> Result<(), CacheError> {
        if self.fail_put_artifact {
            return Err(injected("PutArtifact"));
        }
        self.put_artifacts.fetch_add(1, Ordering::SeqCst);
        self.inner.put_artifact(artifact_id, info).await
    }

    async fn put_blob(&self, blob_id: &str, blob: &BlobInfo) -> Result<(), CacheError> {
        if self.fail_put_blob {
            return Err(injected("PutBlob"));
        }
        self.put_blobs.fetch_add(1, Ordering::SeqCst);
        self.inner.put_blob(blob_id, blob).await
    }

    async fn get_artifact(&self, artifact_id: &str) -> Result<ArtifactInfo, CacheError> {
        self.inner.get_artifact(artifact_id).await
    }

    async fn get_blob(&self, blob_id: &str) -> Result<BlobInfo, CacheError> {
        self.inner.get_blob(blob_id).await
    }

    async fn delete_blobs(&self, blob_ids: &[String]) -> Result<(), CacheError> {
        self.inner.delete_blobs(blob_ids).await
    }

    async fn clear(&self) -> Result<(), CacheError> {
        self.inner.clear().await
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}

fn inspector(cache: Arc<CountingCache>, config: InspectorConfig) -> Inspector {
    Inspector::new(cache, &AnalyzerRegistry::builtin(), config).unwrap()
}

fn sample_project(root: &Path) {
    write(
        root,
        "app/package-lock.json",
        r#"{
  "name": "app",
  "lockfileVersion": 3,
  "packages": {
    "": {"name": "app", "version": "1.0.0"},
    "node_modules/express": {"version": "4.18.2"}
  }
}"#,
    );
    write(root, "README.md", "# app\n");
}

#[tokio::test]
async fn second_scan_is_fully_cached() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());

    let cache = Arc::new(CountingCache::default());
    let inspector = inspector(cache.clone(), InspectorConfig::default());
    let source = LocalSource::filesystem(dir.path());
    let cancel = CancellationToken::new();

    let first = inspector.inspect(&source, &cancel).await.unwrap();
    assert_eq!(cache.put_blobs.load(Ordering::SeqCst), 1);
    assert_eq!(cache.put_artifacts.load(Ordering::SeqCst), 1);

    let second = inspector.inspect(&source, &cancel).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.put_blobs.load(Ordering::SeqCst), 1);
    assert_eq!(cache.put_artifacts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn every_blob_is_cached_after_inspect() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());

    let cache = Arc::new(CountingCache::default());
    let reference = inspector(cache.clone(), InspectorConfig::default())
        .inspect(&LocalSource::filesystem(dir.path()), &CancellationToken::new())
        .await
        .unwrap();

    let missing = cache
        .missing_blobs(&reference.id, &reference.blob_ids)
        .await
        .unwrap();
    assert!(!missing.missing_artifact);
    assert!(missing.missing_blob_ids.is_empty());

    let outcome = Applier::new(cache)
        .apply_layers(&reference.id, &reference.blob_ids)
        .await
        .unwrap();
    let app = &outcome.detail.applications[0];
    assert_eq!(app.app_type, "npm");
    assert_eq!(app.file_path, "app/package-lock.json");
    assert_eq!(app.libraries[0].name, "express");
    assert!(outcome.warning.is_none());
}

#[tokio::test]
async fn changing_content_or_analyzers_changes_id() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    let source = LocalSource::filesystem(dir.path());
    let cancel = CancellationToken::new();

    let default_id = inspector(Arc::default(), InspectorConfig::default())
        .inspect(&source, &cancel)
        .await
        .unwrap()
        .id;

    let without_secret = InspectorConfigBuilder::new()
        .disabled_analyzers(vec![AnalyzerType::Secret])
        .build()
        .unwrap();
    let disabled_id = inspector(Arc::default(), without_secret)
        .inspect(&source, &cancel)
        .await
        .unwrap()
        .id;
    assert_ne!(default_id, disabled_id);

    write(dir.path(), "README.md", "# app v2\n");
    let changed_id = inspector(Arc::default(), InspectorConfig::default())
        .inspect(&source, &cancel)
        .await
        .unwrap()
        .id;
    assert_ne!(default_id, changed_id);
}

#[tokio::test]
async fn changing_max_file_size_reanalyzes() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    let source = LocalSource::filesystem(dir.path());
    let cancel = CancellationToken::new();
    let cache = Arc::new(CountingCache::default());

    let tiny = InspectorConfigBuilder::new().max_file_size(8).build().unwrap();
    let small = inspector(cache.clone(), tiny)
        .inspect(&source, &cancel)
        .await
        .unwrap();
    let outcome = Applier::new(cache.clone())
        .apply_layers(&small.id, &small.blob_ids)
        .await
        .unwrap();
    assert!(outcome.detail.applications.is_empty());

    let full = inspector(cache.clone(), InspectorConfig::default())
        .inspect(&source, &cancel)
        .await
        .unwrap();
    assert_ne!(small.blob_ids, full.blob_ids);
    assert_ne!(small.id, full.id);
    assert_eq!(cache.put_blobs.load(Ordering::SeqCst), 2);

    let outcome = Applier::new(cache)
        .apply_layers(&full.id, &full.blob_ids)
        .await
        .unwrap();
    assert_eq!(outcome.detail.applications[0].libraries[0].name, "express");
}

#[tokio::test]
async fn duplicate_and_unknown_missing_ids_are_tolerated() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());

    let cache = Arc::new(CountingCache {
        noisy_missing: true,
        ..Default::default()
    });
    let reference = inspector(cache.clone(), InspectorConfig::default())
        .inspect(&LocalSource::filesystem(dir.path()), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reference.blob_ids.len(), 1);
    assert_eq!(cache.put_blobs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_directory_is_walk_error() {
    let err = inspector(Arc::default(), InspectorConfig::default())
        .inspect(
            &LocalSource::filesystem("/nonexistent/layerscan-artifact"),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("walk error"), "{err}");
}

#[tokio::test]
async fn cache_failures_are_wrapped() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());
    let source = LocalSource::filesystem(dir.path());
    let cancel = CancellationToken::new();

    let cases = [
        (
            CountingCache {
                fail_missing: true,
                ..Default::default()
            },
            "MissingBlobs failed",
        ),
        (
            CountingCache {
                fail_put_blob: true,
                ..Default::default()
            },
            "failed to store blob",
        ),
        (
            CountingCache {
                fail_put_artifact: true,
                ..Default::default()
            },
            "failed to store artifact",
        ),
    ];

    for (cache, expected) in cases {
        let err = inspector(Arc::new(cache), InspectorConfig::default())
            .inspect(&source, &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains(expected), "{err}");
    }
}

#[tokio::test]
async fn cancelled_before_analysis() {
    let dir = tempfile::tempdir().unwrap();
    sample_project(dir.path());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = inspector(Arc::default(), InspectorConfig::default())
        .inspect(&LocalSource::filesystem(dir.path()), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "cancelled");
}

// ─── Container image ────────────────────────────────────────────────

fn write_image(root: &Path, layers: &[&str]) {
    let diff_ids: Vec<String> = (0..layers.len()).map(|i| format!("sha256:{i:064}")).collect();
    let history: Vec<serde_json::Value> = layers
        .iter()
        .map(|l| serde_json::json!({"created_by": format!("/bin/sh -c #(nop) ADD {l} in / ")}))
        .collect();
    write(
        root,
        "manifest.json",
        &serde_json::json!([{
            "Config": "config.json",
            "RepoTags": ["alpine:3.11"],
            "Layers": layers,
        }])
        .to_string(),
    );
    write(
        root,
        "config.json",
        &serde_json::json!({
            "architecture": "amd64",
            "os": "linux",
            "config": {"User": "nobody"},
            "history": history,
            "rootfs": {"type": "layers", "diff_ids": diff_ids},
        })
        .to_string(),
    );
}

#[tokio::test]
async fn alpine_image_reports_musl() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), &["base"]);
    write(dir.path(), "base/etc/alpine-release", "3.11.6\n");
    write(dir.path(), "base/lib/apk/db/installed", APK_INSTALLED);

    let cache = Arc::new(CountingCache::default());
    let source = ImageSource::open(dir.path()).await.unwrap();
    let reference = inspector(cache.clone(), InspectorConfig::default())
        .inspect(&source, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reference.name, "alpine:3.11");
    assert_eq!(reference.blob_ids.len(), 1);

    let missing = cache.last_missing.lock().unwrap().clone().unwrap();
    assert!(missing.missing_artifact);
    assert_eq!(missing.missing_blob_ids, reference.blob_ids);
    assert_eq!(cache.put_blobs.load(Ordering::SeqCst), 1);

    let blob = cache.get_blob(&reference.blob_ids[0]).await.unwrap();
    let ids: Vec<&str> = blob
        .package_infos
        .iter()
        .flat_map(|info| info.packages.iter().map(|p| p.id.as_str()))
        .collect();
    assert_eq!(ids, vec!["musl@1.1.24-r2"]);
    assert_eq!(blob.package_infos[0].file_path, "lib/apk/db/installed");

    let outcome = Applier::new(cache)
        .apply_layers(&reference.id, &reference.blob_ids)
        .await
        .unwrap();
    let detail = outcome.detail;
    let os = detail.os.unwrap();
    assert_eq!(os.family, "alpine");
    assert_eq!(os.name, "3.11.6");
    assert_eq!(detail.packages.len(), 1);
    assert_eq!(detail.packages[0].id, "musl@1.1.24-r2");
    assert_eq!(detail.packages[0].layer.diff_id, format!("sha256:{:064}", 0));
    assert!(outcome.warning.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn layer_with_two_release_files_reports_same_os_every_run() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), &["base"]);
    write(dir.path(), "base/etc/alpine-release", "3.11.6\n");
    write(dir.path(), "base/etc/debian_version", "10.4\n");
    for i in 0..50 {
        write(dir.path(), &format!("base/usr/share/doc/{i}.txt"), "doc\n");
    }
    let source = ImageSource::open(dir.path()).await.unwrap();

    let mut seen = std::collections::BTreeSet::new();
    let mut ids = std::collections::BTreeSet::new();
    for _ in 0..20 {
        let cache = Arc::new(CountingCache::default());
        let reference = inspector(cache.clone(), InspectorConfig::default())
            .inspect(&source, &CancellationToken::new())
            .await
            .unwrap();
        let blob = cache.get_blob(&reference.blob_ids[0]).await.unwrap();
        seen.insert(blob.os.unwrap().family);
        ids.insert(reference.blob_ids[0].clone());
    }
    assert_eq!(ids.len(), 1);
    assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec!["alpine".to_owned()]);
}

#[tokio::test]
async fn whiteout_in_upper_layer_removes_package_db() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), &["base", "upper"]);
    write(dir.path(), "base/etc/alpine-release", "3.11.6\n");
    write(dir.path(), "base/lib/apk/db/installed", APK_INSTALLED);
    write(dir.path(), "upper/lib/apk/db/.wh.installed", "");

    let cache = Arc::new(CountingCache::default());
    let source = ImageSource::open(dir.path()).await.unwrap();
    let reference = inspector(cache.clone(), InspectorConfig::default())
        .inspect(&source, &CancellationToken::new())
        .await
        .unwrap();

    let upper = cache.get_blob(&reference.blob_ids[1]).await.unwrap();
    assert_eq!(upper.whiteout_files, vec!["lib/apk/db/installed".to_owned()]);

    let outcome = Applier::new(cache)
        .apply_layers(&reference.id, &reference.blob_ids)
        .await
        .unwrap();
    assert!(outcome.detail.packages.is_empty());
    assert_eq!(
        outcome.warning.map(|w| w.to_string()).as_deref(),
        Some("no packages detected")
    );
}

#[tokio::test]
async fn opaque_dir_in_upper_layer_hides_lower_tree() {
    let dir = tempfile::tempdir().unwrap();
    write_image(dir.path(), &["base", "upper"]);
    write(dir.path(), "base/etc/alpine-release", "3.11.6\n");
    write(dir.path(), "base/lib/apk/db/installed", APK_INSTALLED);
    write(dir.path(), "upper/lib/apk/.wh..wh..opq", "");

    let cache = Arc::new(CountingCache::default());
    let source = ImageSource::open(dir.path()).await.unwrap();
    let reference = inspector(cache.clone(), InspectorConfig::default())
        .inspect(&source, &CancellationToken::new())
        .await
        .unwrap();

    let outcome = Applier::new(cache)
        .apply_layers(&reference.id, &reference.blob_ids)
        .await
        .unwrap();
    assert!(outcome.detail.packages.is_empty());
    assert_eq!(outcome.detail.os.unwrap().name, "3.11.6");
}

// ─── SBOM ───────────────────────────────────────────────────────────

#[tokio::test]
async fn sbom_document_round_trips_through_cache() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bom.json");
    std::fs::write(
        &path,
        serde_json::json!({
            "bomFormat": "CycloneDX",
            "specVersion": "1.5",
            "components": [
                {"bom-ref": "os", "type": "operating-system", "name": "alpine", "version": "3.11.6"},
                {"bom-ref": "pkg:apk/alpine/musl@1.1.24-r2", "type": "library", "name": "musl",
                 "version": "1.1.24-r2", "purl": "pkg:apk/alpine/musl@1.1.24-r2?arch=x86_64"}
            ]
        })
        .to_string(),
    )
    .unwrap();

    let cache = Arc::new(CountingCache::default());
    let source = SbomSource::open(&path).await.unwrap();
    let reference = inspector(cache.clone(), InspectorConfig::default())
        .inspect(&source, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(reference.id, reference.blob_ids[0]);

    let outcome = Applier::new(cache)
        .apply_layers(&reference.id, &reference.blob_ids)
        .await
        .unwrap();
    assert_eq!(outcome.detail.os.unwrap().family, "alpine");
    assert_eq!(outcome.detail.packages[0].name, "musl");
    assert_eq!(outcome.detail.packages[0].arch, "x86_64");
}
