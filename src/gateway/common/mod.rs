pub mod retry;
pub mod rotation;

use crate::logging;
use crate::runtime_config;
use crate::util::id;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;

/// 客户端请求日志（DEBUG >= low 时输出）。
pub async fn client_log_middleware(req: Request, next: Next) -> Response {
    let log_level = runtime_config::get().log_level();
    if !log_level.client_enabled() {
        return next.run(req).await;
    }

    let request_id = id::request_id();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    logging::client_request(method.as_str(), &path, req.uri().query());

    let start = Instant::now();
    let resp = next.run(req).await;
    tracing::info!(
        request_id = %request_id,
        "[客户端响应] {} {} {} {}ms",
        method,
        path,
        resp.status().as_u16(),
        logging::format_duration_ms(start.elapsed())
    );
    resp
}
