use std::borrow::Cow;
use std::time::Duration;

/// 日志等级：
/// - off：不输出请求/响应详情
/// - low：输出客户端请求/响应
/// - medium：额外输出后端（YouTube API）请求/响应，响应体格式化并截断
/// - high：后端响应体原样输出
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl LogLevel {
    pub fn parse(debug: &str) -> Self {
        match debug.trim().to_lowercase().as_str() {
            "low" | "client" => Self::Low,
            "medium" | "backend" => Self::Medium,
            "high" | "all" | "raw" => Self::High,
            _ => Self::Off,
        }
    }

    pub fn client_enabled(self) -> bool {
        self >= Self::Low
    }

    pub fn backend_enabled(self) -> bool {
        self >= Self::Medium
    }

    pub fn raw_enabled(self) -> bool {
        self >= Self::High
    }
}

pub fn format_duration_ms(d: Duration) -> i64 {
    d.as_millis().min(i64::MAX as u128) as i64
}

pub fn client_request(method: &str, path: &str, query: Option<&str>) {
    let query = query.map(redact_query).unwrap_or_default();
    let sep = if query.is_empty() { "" } else { "?" };
    tracing::info!("[客户端请求] {method} {path}{sep}{query}");
}

pub fn backend_request(method: &str, url: &str) {
    tracing::info!("[后端请求] {method} {}", redact_url(url));
}

pub fn backend_response(status: u16, duration: Duration, body: &[u8]) {
    tracing::info!(
        "\n====================== 后端响应 ========================\n[后端响应] {} {}ms\n{}\n==========================================================",
        status,
        format_duration_ms(duration),
        format_body_bytes(body)
    );
}

pub fn backend_response_raw(status: u16, duration: Duration, body: &[u8]) {
    tracing::info!(
        "\n=================== 后端响应（RAW） ===================\n[后端响应] {} {}ms\n{}\n=========================================================",
        status,
        format_duration_ms(duration),
        String::from_utf8_lossy(body),
    );
}

/// 把 URL 中的 `key=` 查询参数替换为 `***`。
pub fn redact_url(url: &str) -> Cow<'_, str> {
    match url.split_once('?') {
        Some((base, query)) => Cow::Owned(format!("{base}?{}", redact_query(query))),
        None => Cow::Borrowed(url),
    }
}

fn redact_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((k, _)) if k.eq_ignore_ascii_case("key") => format!("{k}=***"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn format_body_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    match sonic_rs::from_slice::<sonic_rs::Value>(bytes) {
        Ok(v) => match sonic_rs::to_string_pretty(&v) {
            Ok(s) => truncate_text_for_log(&s),
            Err(_) => truncate_text_for_log(&v.to_string()),
        },
        Err(_) => truncate_text_for_log(&String::from_utf8_lossy(bytes)),
    }
}

fn truncate_text_for_log(s: &str) -> String {
    const MAX_CHARS: usize = 16 * 1024;
    if s.chars().count() <= MAX_CHARS {
        return s.to_string();
    }
    let mut out: String = s.chars().take(MAX_CHARS).collect();
    out.push_str("...[TRUNCATED]");
    out
}
