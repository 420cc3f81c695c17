//! 前端使用的视频接口：热门、搜索、统计、频道信息。
//!
//! 每个接口都是一次「逻辑操作」，通过 `with_key_rotation` 在 key 池内轮换重试。

use axum::Json;
use axum::extract::{Path, Query, State};
use std::future::Future;
use std::sync::Arc;

use crate::config;
use crate::credential::{Credential, OperationKind};
use crate::error::AppError;
use crate::gateway::AppState;
use crate::gateway::common::rotation::with_key_rotation;
use crate::gateway::videos::types::{
    ChannelView, ItemsResponse, SearchQuery, StatisticsView, TrendingQuery, VideoCard,
};
use crate::runtime_config;
use crate::youtube::ApiError;

const DEFAULT_MAX_RESULTS: u32 = 24;
const MAX_QUERY_CHARS: usize = 200;

/// GET /api/trending?region=US&maxResults=24
pub async fn handle_trending(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TrendingQuery>,
) -> Result<Json<ItemsResponse<VideoCard>>, AppError> {
    let region = match q.region.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(r) => config::normalize_region(Some(r))
            .ok_or_else(|| AppError::bad_request(format!("无效的地区码: {r}")))?,
        None => runtime_config::get().default_region.clone(),
    };
    let max = q.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

    let yt = &state.youtube;
    let region_ref = region.as_str();
    let resp = rotate(&state, OperationKind::VideoList, |cred| async move {
        yt.trending(&cred.key, region_ref, max).await
    })
    .await?;

    if resp.items.is_empty() {
        tracing::info!(region = %region, "热门视频列表为空");
    }
    let items = resp.items.iter().filter_map(VideoCard::from_video).collect();
    Ok(Json(ItemsResponse { items }))
}

/// GET /api/search?q=...&maxResults=24
pub async fn handle_search(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<ItemsResponse<VideoCard>>, AppError> {
    let query = q.q.trim();
    if query.is_empty() {
        return Err(AppError::bad_request("搜索关键词不能为空"));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(AppError::bad_request("搜索关键词过长"));
    }
    let max = q.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

    let yt = &state.youtube;
    let resp = rotate(&state, OperationKind::Search, |cred| async move {
        yt.search(&cred.key, query, max).await
    })
    .await?;

    let items = resp.items.iter().filter_map(VideoCard::from_search).collect();
    Ok(Json(ItemsResponse { items }))
}

/// GET /api/videos/{id}/statistics
pub async fn handle_statistics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<StatisticsView>, AppError> {
    let id = validate_id(&id, "视频")?;

    let yt = &state.youtube;
    let resp = rotate(&state, OperationKind::VideoDetails, |cred| async move {
        yt.video_statistics(&cred.key, id).await
    })
    .await?;

    let video = resp
        .items
        .first()
        .ok_or_else(|| AppError::not_found(format!("视频 {id} 不存在")))?;
    Ok(Json(StatisticsView::from_video(video)))
}

/// GET /api/channels/{id}
///
/// 频道信息变化很慢，命中缓存时不消耗配额。
pub async fn handle_channel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ChannelView>, AppError> {
    let id = validate_id(&id, "频道")?;
    if let Some(view) = state.channel_cache.get(id).await {
        return Ok(Json(view));
    }

    let yt = &state.youtube;
    let resp = rotate(&state, OperationKind::ChannelDetails, |cred| async move {
        yt.channel(&cred.key, id).await
    })
    .await?;

    let channel = resp
        .items
        .first()
        .ok_or_else(|| AppError::not_found(format!("频道 {id} 不存在")))?;
    let view = ChannelView::from_channel(channel);
    state
        .channel_cache
        .insert(id.to_string(), view.clone())
        .await;
    Ok(Json(view))
}

/// 带 key 轮换地执行一次逻辑操作，结束后立即把失败集合落盘。
async fn rotate<T, F, Fut>(state: &AppState, kind: OperationKind, op: F) -> Result<T, AppError>
where
    F: FnMut(Credential) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let res = with_key_rotation(&state.dispatcher, kind, op).await;
    state.persist_failures().await;
    Ok(res?)
}

/// 视频/频道 ID 只允许 URL 安全字符。
fn validate_id<'a>(id: &'a str, what: &str) -> Result<&'a str, AppError> {
    let id = id.trim();
    let ok = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(id)
    } else {
        Err(AppError::bad_request(format!("无效的{what} ID")))
    }
}
