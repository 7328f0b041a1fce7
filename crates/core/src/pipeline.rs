//! 파이프라인 공용 타입: trait 확장 포인트에서 쓰는 보조 타입

use std::future::Future;
use std::pin::Pin;

/// dyn-compatible trait에서 반환하는 boxed future
///
/// RPITIT(`impl Future`)를 사용하는 trait은 `dyn`으로 쓸 수 없으므로,
/// 동적 디스패치용 twin trait은 이 타입을 반환합니다.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
