//! 管理接口处理器。

use axum::{
    Json,
    extract::{Path, Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::credential::KeyStats;
use crate::credential::types::mask_key;
use crate::error::AppError;
use crate::gateway::AppState;
use crate::runtime_config::{self, SettingsPayload};

// ============================================================================
// Key 池
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysOverview {
    pub key_count: usize,
    pub available_count: usize,
    pub current_index: usize,
    pub last_dispatched: Option<usize>,
    pub min_interval_ms: u64,
    pub keys: Vec<KeyStats>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateResponse {
    pub index: usize,
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }
}

/// GET /manager/api/keys
pub async fn handle_keys(State(state): State<Arc<AppState>>) -> Json<KeysOverview> {
    let d = &state.dispatcher;
    Json(KeysOverview {
        key_count: d.key_count(),
        available_count: d.available_count().await,
        current_index: d.current_index().await,
        last_dispatched: d.last_dispatched().await,
        min_interval_ms: d.min_interval().as_millis().min(u64::MAX as u128) as u64,
        keys: d.stats().await,
    })
}

/// POST /manager/api/keys/rotate - 强制切到下一个 key
pub async fn handle_rotate(State(state): State<Arc<AppState>>) -> Json<RotateResponse> {
    let cred = state.dispatcher.force_rotate().await;
    Json(RotateResponse {
        index: cred.index,
        key: cred.masked(),
    })
}

/// POST /manager/api/keys/reset - 清空失败集合与配额计数
pub async fn handle_reset(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ActionResponse>, AppError> {
    state.dispatcher.reset_failures().await;
    state.dispatcher.reset_usage().await;
    state.store.mark_reset(Utc::now()).await?;
    tracing::info!("已手动重置所有 key 的失败状态");
    Ok(Json(ActionResponse::ok("已重置所有 key")))
}

/// POST /manager/api/keys/{index}/fail - 人工标记某个 key 失效
pub async fn handle_mark_failed(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<ActionResponse>, AppError> {
    let d = &state.dispatcher;
    if index >= d.key_count() {
        return Err(AppError::bad_request(format!(
            "key 序号越界: {index}（共 {} 个）",
            d.key_count()
        )));
    }

    let newly_failed = d.report_failure(index).await;
    state.persist_failures().await;

    let message = if newly_failed {
        format!("key #{index} 已标记为失效")
    } else {
        format!("key #{index} 已处于失效状态")
    };
    Ok(Json(ActionResponse::ok(message)))
}

#[derive(Debug, Deserialize)]
pub struct FailByKeyRequest {
    pub key: String,
}

/// POST /manager/api/keys/fail - 按 key 内容标记失效（运维只知道 key 本身时使用）
pub async fn handle_mark_failed_by_key(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FailByKeyRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let key = req.key.trim();
    if key.is_empty() {
        return Err(AppError::bad_request("key 不能为空"));
    }

    let d = &state.dispatcher;
    if d.index_of(key).is_none() {
        return Err(AppError::not_found("key 不在池中"));
    }
    d.report_failure_key(key).await;
    state.persist_failures().await;
    Ok(Json(ActionResponse::ok(format!("key {} 已标记为失效", mask_key(key)))))
}

// ============================================================================
// 设置处理器
// ============================================================================

/// GET /manager/api/settings
pub async fn handle_settings_get() -> Json<SettingsPayload> {
    Json(SettingsPayload::from_runtime(&runtime_config::get()))
}

/// POST /manager/api/settings - 合并并立即生效（不持久化，重启后以环境变量为准）
pub async fn handle_settings_post(
    Json(req): Json<SettingsPayload>,
) -> Result<Json<SettingsPayload>, AppError> {
    let current = runtime_config::get();
    let next = req.apply_to(&current).map_err(AppError::bad_request)?;
    runtime_config::update(next.clone());

    tracing::info!(
        "设置已更新: Debug={}, DefaultRegion={}",
        next.debug,
        next.default_region
    );
    Ok(Json(SettingsPayload::from_runtime(&next)))
}

// ============================================================================
// 认证中间件
// ============================================================================

/// Manager 认证中间件：`Authorization: Bearer <MANAGER_TOKEN>`。
///
/// 未配置 MANAGER_TOKEN 时管理接口整体关闭。
pub async fn manager_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    match check_auth(request.headers(), &state.cfg.manager_token) {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

fn check_auth(headers: &HeaderMap, token: &str) -> Result<(), AppError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::forbidden("管理接口未启用（未配置 MANAGER_TOKEN）"));
    }

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or_default();

    if provided == token {
        Ok(())
    } else {
        Err(AppError::unauthorized("管理令牌无效"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::credential::KeyDispatcher;
    use crate::credential::store::Store;
    use crate::youtube::YouTubeClient;
    use axum::http::{HeaderValue, StatusCode};
    use std::time::Duration;

    fn test_state(keys: &[&str]) -> Arc<AppState> {
        let cfg = Config {
            proxy: "off".to_string(),
            manager_token: "secret".to_string(),
            ..Config::default()
        };
        let dispatcher = Arc::new(KeyDispatcher::new(keys.iter().copied(), Duration::ZERO).unwrap());
        let dir = std::env::temp_dir().join(format!("tubegate-m-{}", uuid::Uuid::new_v4().simple()));
        let store = Arc::new(Store::new(dir.to_str().unwrap()));
        let youtube = YouTubeClient::new(&cfg).unwrap();
        Arc::new(AppState::new(cfg, dispatcher, store, youtube))
    }

    fn bearer(v: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, HeaderValue::from_str(v).unwrap());
        h
    }

    #[test]
    fn auth_requires_configured_token() {
        let err = check_auth(&bearer("Bearer x"), "").unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = check_auth(&HeaderMap::new(), "secret").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = check_auth(&bearer("Bearer wrong"), "secret").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        assert!(check_auth(&bearer("Bearer secret"), "secret").is_ok());
    }

    #[tokio::test]
    async fn mark_failed_then_reset() {
        let state = test_state(&["key-aaaa-0001", "key-bbbb-0002", "key-cccc-0003"]);

        handle_mark_failed(State(state.clone()), Path(1)).await.unwrap();
        let Json(overview) = handle_keys(State(state.clone())).await;
        assert_eq!(overview.key_count, 3);
        assert_eq!(overview.available_count, 2);
        assert!(overview.keys[1].is_failed);
        assert_eq!(state.store.snapshot().await.failed, vec![1]);

        let err = handle_mark_failed(State(state.clone()), Path(7))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        handle_reset(State(state.clone())).await.unwrap();
        assert_eq!(state.dispatcher.available_count().await, 3);
        let snap = state.store.snapshot().await;
        assert!(snap.failed.is_empty());
        assert!(snap.last_reset().is_some());
    }

    #[tokio::test]
    async fn overview_reports_pacing_and_last_dispatch() {
        let state = test_state(&["key-aaaa-0001", "key-bbbb-0002"]);
        let Json(before) = handle_keys(State(state.clone())).await;
        assert_eq!(before.last_dispatched, None);
        assert_eq!(before.min_interval_ms, 0);

        state.dispatcher.acquire().await;
        let Json(after) = handle_keys(State(state)).await;
        assert_eq!(after.last_dispatched, Some(0));
        assert_eq!(after.current_index, 1);
    }

    #[tokio::test]
    async fn mark_failed_by_key_persists_and_rejects_unknown() {
        let state = test_state(&["key-aaaa-0001", "key-bbbb-0002"]);

        handle_mark_failed_by_key(
            State(state.clone()),
            Json(FailByKeyRequest {
                key: " key-bbbb-0002 ".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(state.dispatcher.failed_indices().await, vec![1]);
        assert_eq!(state.store.snapshot().await.failed, vec![1]);

        let err = handle_mark_failed_by_key(
            State(state.clone()),
            Json(FailByKeyRequest {
                key: "key-zzzz-9999".to_string(),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rotate_returns_masked_key() {
        let state = test_state(&["key-aaaa-0001", "key-bbbb-0002"]);

        let Json(first) = handle_rotate(State(state.clone())).await;
        let Json(second) = handle_rotate(State(state.clone())).await;
        assert_ne!(first.index, second.index);
        assert!(!first.key.contains("aaaa"));
        assert!(!second.key.contains("bbbb"));
    }

    #[tokio::test]
    async fn settings_post_rejects_invalid_payload() {
        let err = handle_settings_post(Json(SettingsPayload {
            debug: Some("loud".to_string()),
            default_region: None,
        }))
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
