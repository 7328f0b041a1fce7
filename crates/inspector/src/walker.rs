//! 병렬 파일 트리 순회
//!
//! [`walk_dir`]는 루트 아래의 일반 파일을 열거하여 제한된 크기의 워커 풀에 넘기고,
//! 워커가 만든 결과를 단일 소비자(호출 태스크)에서 하나씩 `on_result`로 전달합니다.
//!
//! # 동작 구조
//!
//! ```text
//! walkdir (spawn_blocking) --mpsc(경로)--> 워커 N개 --spawn_blocking(on_file)-->
//!     --mpsc(결과)--> 소비자 (on_result, 호출 태스크)
//! ```
//!
//! - 열거, 워커, `on_result` 중 처음 발생한 에러가 반환되고 나머지 작업은 취소됩니다.
//! - 파일 처리 순서는 보장하지 않습니다.
//! - `on_result`는 한 번에 하나씩 호출되므로 내부 잠금이 필요 없습니다.

use std::fs::{File, Metadata};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use walkdir::WalkDir;

use layerscan_core::metrics as m;

use crate::error::InspectorError;

/// 큐 용량 = 워커 수 x 이 값
const QUEUE_DEPTH_PER_WORKER: usize = 4;

/// 워커에 전달되는 파일 메타데이터
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    /// 파일 크기 (바이트)
    pub size: u64,
    /// 권한 비트 (unix 외 플랫폼에서는 0)
    pub mode: u32,
    /// 실행 비트 설정 여부
    pub executable: bool,
}

impl FileInfo {
    /// 파일 메타데이터에서 생성합니다.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::PermissionsExt;
            metadata.permissions().mode()
        };
        #[cfg(not(unix))]
        let mode = 0;

        Self {
            size: metadata.len(),
            mode,
            executable: mode & 0o111 != 0,
        }
    }
}

/// 순회 옵션
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// 워커 수
    pub concurrency: usize,
    /// 건너뛸 파일 (루트 기준 상대 경로, `/` 구분)
    pub skip_files: Vec<String>,
    /// 건너뛸 디렉토리 (루트 기준 상대 경로, 하위 전체를 가지치기)
    pub skip_dirs: Vec<String>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            skip_files: Vec::new(),
            skip_dirs: Vec::new(),
        }
    }
}

struct WalkEntry {
    rel: String,
    abs: PathBuf,
}

/// 처음 기록된 에러를 보관하고 토큰을 취소합니다.
#[derive(Default)]
struct FirstError(Mutex<Option<InspectorError>>);

impl FirstError {
    fn record(&self, err: InspectorError, token: &CancellationToken) {
        let mut slot = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            debug!(error = %err, "walk aborted");
            *slot = Some(err);
        }
        drop(slot);
        token.cancel();
    }

    fn take(&self) -> Option<InspectorError> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// 루트 아래 모든 일반 파일에 `on_file`을 병렬로 적용하고 결과를 `on_result`로 모읍니다.
///
/// `on_file`은 루트 기준 상대 경로, 메타데이터, 탐색 가능한 파일 핸들을 받습니다.
/// `Ok(None)`을 반환하면 결과가 전달되지 않습니다.
///
/// # Errors
///
/// - 루트가 없거나 열거에 실패하면 `walk error`
/// - 파일 열기/메타데이터 실패는 `file open error` / `stat error`
/// - `on_file` 실패는 `on file`, `on_result` 실패는 `on result`로 감싸서 반환
/// - 외부 토큰이 취소되면 [`InspectorError::Cancelled`]
pub async fn walk_dir<T, F, R>(
    root: &Path,
    opts: &WalkOptions,
    cancel: &CancellationToken,
    on_file: F,
    mut on_result: R,
) -> Result<(), InspectorError>
where
    T: Send + 'static,
    F: Fn(&str, &FileInfo, &mut File) -> Result<Option<T>, InspectorError>
        + Send
        + Sync
        + 'static,
    R: FnMut(T) -> Result<(), InspectorError>,
{
    let token = cancel.child_token();
    let first_error = Arc::new(FirstError::default());
    let concurrency = opts.concurrency.max(1);
    let depth = concurrency * QUEUE_DEPTH_PER_WORKER;

    let (path_tx, path_rx) = mpsc::channel::<WalkEntry>(depth);
    let (result_tx, mut result_rx) = mpsc::channel::<T>(depth);

    // --- 열거 ---
    let enumerator = {
        let root = root.to_path_buf();
        let skip_files = opts.skip_files.clone();
        let skip_dirs = opts.skip_dirs.clone();
        let token = token.clone();
        let first_error = Arc::clone(&first_error);
        tokio::task::spawn_blocking(move || {
            if let Err(e) = enumerate(&root, &skip_files, &skip_dirs, &path_tx, &token) {
                first_error.record(e, &token);
            }
        })
    };

    // --- 워커 풀 ---
    let path_rx = Arc::new(tokio::sync::Mutex::new(path_rx));
    let on_file = Arc::new(on_file);
    let mut workers = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        let path_rx = Arc::clone(&path_rx);
        let on_file = Arc::clone(&on_file);
        let result_tx = result_tx.clone();
        let token = token.clone();
        let first_error = Arc::clone(&first_error);

        workers.push(tokio::spawn(async move {
            loop {
                let entry = {
                    let mut rx = path_rx.lock().await;
                    tokio::select! {
                        _ = token.cancelled() => None,
                        entry = rx.recv() => entry,
                    }
                };
                let Some(entry) = entry else { break };

                let on_file = Arc::clone(&on_file);
                let outcome =
                    tokio::task::spawn_blocking(move || process_file(&entry, on_file.as_ref()))
                        .await
                        .unwrap_or_else(|e| {
                            Err(InspectorError::Task(format!("spawn_blocking failed: {e}")))
                        });

                match outcome {
                    Ok(Some(value)) => {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            sent = result_tx.send(value) => {
                                if sent.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        first_error.record(e, &token);
                        break;
                    }
                }
            }
        }));
    }
    // 워커만 송신자를 가지도록 해서 모든 워커가 끝나면 수신이 종료되게 합니다.
    drop(path_rx);
    drop(result_tx);

    // --- 소비자 ---
    loop {
        let next = tokio::select! {
            _ = token.cancelled() => None,
            value = result_rx.recv() => value,
        };
        let Some(value) = next else { break };
        if let Err(e) = on_result(value) {
            first_error.record(InspectorError::OnResult(Box::new(e)), &token);
            break;
        }
    }

    token.cancel();
    drop(result_rx);

    for worker in workers {
        if let Err(e) = worker.await {
            first_error.record(InspectorError::Task(format!("worker failed: {e}")), &token);
        }
    }
    if let Err(e) = enumerator.await {
        first_error.record(
            InspectorError::Task(format!("spawn_blocking failed: {e}")),
            &token,
        );
    }

    if let Some(err) = first_error.take() {
        return Err(err);
    }
    if cancel.is_cancelled() {
        return Err(InspectorError::Cancelled);
    }
    Ok(())
}

/// 일반 파일을 열거해 경로 큐에 넣습니다 (블로킹 스레드에서 실행).
fn enumerate(
    root: &Path,
    skip_files: &[String],
    skip_dirs: &[String],
    tx: &mpsc::Sender<WalkEntry>,
    token: &CancellationToken,
) -> Result<(), InspectorError> {
    std::fs::metadata(root).map_err(|e| InspectorError::Walk {
        path: root.display().to_string(),
        reason: e.to_string(),
    })?;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let rel = relative_path(root, entry.path());
            !skip_dirs.iter().any(|d| *d == rel)
        });

    for entry in walker {
        if token.is_cancelled() {
            return Ok(());
        }

        let entry = entry.map_err(|e| InspectorError::Walk {
            path: e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| root.display().to_string()),
            reason: e.to_string(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let rel = relative_path(root, entry.path());
        if skip_files.iter().any(|f| *f == rel) {
            trace!(path = %rel, "skipping file");
            continue;
        }

        let item = WalkEntry {
            rel,
            abs: entry.into_path(),
        };
        if tx.blocking_send(item).is_err() {
            // 워커가 모두 종료됨 (취소)
            return Ok(());
        }
    }

    Ok(())
}

fn process_file<T, F>(entry: &WalkEntry, on_file: &F) -> Result<Option<T>, InspectorError>
where
    F: Fn(&str, &FileInfo, &mut File) -> Result<Option<T>, InspectorError>,
{
    let mut file = File::open(&entry.abs).map_err(|source| InspectorError::FileOpen {
        path: entry.rel.clone(),
        source,
    })?;
    let metadata = file.metadata().map_err(|source| InspectorError::Stat {
        path: entry.rel.clone(),
        source,
    })?;
    let info = FileInfo::from_metadata(&metadata);

    metrics::counter!(m::WALKER_FILES_TOTAL).increment(1);

    on_file(&entry.rel, &info, &mut file).map_err(|e| InspectorError::OnFile {
        path: entry.rel.clone(),
        source: Box::new(e),
    })
}

/// 루트 기준 상대 경로를 `/` 구분 문자열로 만듭니다.
fn relative_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
