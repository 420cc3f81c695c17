//! 调用方的 key 轮换重试循环。
//!
//! 对一次逻辑操作：拿 key → 请求 → 若被拒（403）则回报失败并换下一个 key，
//! 最多尝试 key 池大小次；全部被拒时返回 `Exhausted`，并带上最后一次的错误。
//! 非配额错误（网络、解析、其他状态码）不轮换，立即返回。

use crate::credential::{Credential, KeyDispatcher, OperationKind};
use crate::gateway::common::retry::KeyRejection;
use std::future::Future;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RotationError<E> {
    #[error("已尝试全部 {attempts} 个 API key 均被拒绝，最后错误：{last}")]
    Exhausted { attempts: usize, last: E },

    #[error("{0}")]
    Failed(E),
}

pub async fn with_key_rotation<T, E, F, Fut>(
    dispatcher: &KeyDispatcher,
    kind: OperationKind,
    mut op: F,
) -> Result<T, RotationError<E>>
where
    F: FnMut(Credential) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: KeyRejection + std::fmt::Display,
{
    let attempts = dispatcher.key_count();
    let mut attempt = 0usize;

    loop {
        attempt += 1;
        let cred = dispatcher.acquire_for(kind).await;
        let index = cred.index;

        match op(cred).await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_key_rejection() => {
                tracing::warn!(
                    op = kind.as_str(),
                    key_index = index,
                    attempt,
                    attempts,
                    reason = e.rejection_reason().unwrap_or("-"),
                    error = %e,
                    "API key 被拒绝，切换下一个 key"
                );
                dispatcher.report_failure(index).await;
                if attempt >= attempts {
                    return Err(RotationError::Exhausted { attempts, last: e });
                }
            }
            Err(e) => return Err(RotationError::Failed(e)),
        }
    }
}
