pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod runtime_config;
pub mod util;
pub mod youtube;

use anyhow::Context;
use axum::routing::{get, post};
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::credential::{KeyDispatcher, QuotaCostTable};
use crate::gateway::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::Config::load();

    init_tracing(&cfg);

    // 初始化运行时配置
    runtime_config::init(&cfg);

    // 分发器只在这里构造一次，之后通过 AppState 共享给所有调用方。
    let dispatcher = KeyDispatcher::new(&cfg.api_keys, cfg.min_key_interval())
        .context("初始化 key 分发器失败（请设置 YOUTUBE_API_KEYS）")?
        .with_quota(QuotaCostTable::youtube_v3(), cfg.quota_daily_limit);
    let dispatcher = Arc::new(dispatcher);
    tracing::info!(
        "已加载 {} 个 API key，最小调用间隔 {}ms",
        dispatcher.key_count(),
        cfg.min_key_interval_ms
    );

    let store = Arc::new(credential::store::Store::new(&cfg.data_dir));
    match store.load().await {
        Ok(state) => {
            if !state.failed.is_empty() {
                tracing::info!("恢复 {} 个失效 key 状态", state.failed.len());
            }
            dispatcher.restore_failures(&state.failed).await;
        }
        Err(e) => tracing::warn!("加载 key_state.json 失败: {e:#}"),
    }

    // 后台任务：按窗口清空失败集合与配额计数。
    credential::reset_task::spawn_daily_reset_task(
        dispatcher.clone(),
        store.clone(),
        cfg.reset_window(),
    );

    let youtube =
        youtube::YouTubeClient::new(&cfg).context("初始化 YouTubeClient 失败")?;

    let state = Arc::new(AppState::new(
        cfg.clone(),
        dispatcher,
        store,
        youtube,
    ));

    // === 公开路由 ===
    let public_routes = Router::new().route("/health", get(handle_health));

    // === 视频 API 路由 ===
    let api_routes = Router::new()
        .route(
            "/api/trending",
            get(gateway::videos::handler::handle_trending),
        )
        .route("/api/search", get(gateway::videos::handler::handle_search))
        .route(
            "/api/videos/{id}/statistics",
            get(gateway::videos::handler::handle_statistics),
        )
        .route(
            "/api/channels/{id}",
            get(gateway::videos::handler::handle_channel),
        )
        .with_state(state.clone());

    // === Manager API 路由（需要认证）===
    let manager_routes = Router::new()
        .route("/manager/api/keys", get(gateway::manager::handle_keys))
        .route(
            "/manager/api/keys/rotate",
            post(gateway::manager::handle_rotate),
        )
        .route(
            "/manager/api/keys/reset",
            post(gateway::manager::handle_reset),
        )
        .route(
            "/manager/api/keys/fail",
            post(gateway::manager::handle_mark_failed_by_key),
        )
        .route(
            "/manager/api/keys/{index}/fail",
            post(gateway::manager::handle_mark_failed),
        )
        .route(
            "/manager/api/settings",
            get(gateway::manager::handle_settings_get).post(gateway::manager::handle_settings_post),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gateway::manager::manager_auth_middleware,
        ))
        .with_state(state.clone());

    // 组合所有路由
    let app = Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(manager_routes)
        .layer(middleware::from_fn(
            gateway::common::client_log_middleware,
        ));

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], cfg.port)));

    tracing::info!("Server listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("绑定监听端口失败")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务异常退出")?;

    // 退出前把失败集合落盘，避免重启后丢失本窗口内的 403 记录。
    state.persist_failures().await;

    Ok(())
}

async fn handle_health() -> &'static str {
    "ok"
}

fn init_tracing(cfg: &config::Config) {
    // 依赖库日志默认压到 warn，本项目日志至少 info。
    // DEBUG 只控制请求/响应详细日志块，不影响这里的基础日志。
    let env = std::env::var("RUST_LOG").unwrap_or_default();
    let env = env.trim();
    let filter = if env.is_empty() {
        EnvFilter::new("warn,tubegate=info")
    } else if env.contains("tubegate") {
        EnvFilter::new(env)
    } else {
        EnvFilter::new(format!("{env},tubegate=info"))
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .try_init();

    tracing::debug!("DEBUG 日志级别: {:?}", cfg.log_level());
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("收到退出信号，准备关闭服务...");
}
