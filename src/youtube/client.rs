use crate::config::Config;
use crate::logging;
use crate::runtime_config;
use crate::youtube::types::{Channel, ListResponse, SearchResult, Video};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const MAX_RESULTS_LIMIT: u32 = 50;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("YouTube API 错误 {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// `error.errors[0].reason`，例如 quotaExceeded / keyInvalid。
        reason: String,
    },

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] sonic_rs::Error),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Http { reason, .. } if !reason.is_empty() => Some(reason.as_str()),
            _ => None,
        }
    }
}

/// YouTube Data API v3 客户端。
///
/// 不持有任何 key：每次调用由上层传入从分发器拿到的 key。
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    base: String,
}

impl YouTubeClient {
    pub fn new(cfg: &Config) -> Result<Self, anyhow::Error> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .default_headers(default_headers());

        if cfg.timeout_ms > 0 {
            builder = builder.timeout(Duration::from_millis(cfg.timeout_ms));
        }
        // PROXY 为空：沿用系统代理环境变量；off/none：显式禁用代理。
        match cfg.proxy.trim() {
            "" => {}
            "off" | "none" => builder = builder.no_proxy(),
            proxy => builder = builder.proxy(reqwest::Proxy::all(proxy)?),
        }

        Ok(Self {
            http: builder.build()?,
            base: cfg.api_base.trim_end_matches('/').to_string(),
        })
    }

    /// 热门视频（chart=mostPopular）。
    pub async fn trending(
        &self,
        key: &str,
        region: &str,
        max_results: u32,
    ) -> Result<ListResponse<Video>, ApiError> {
        let max = clamp_max_results(max_results).to_string();
        self.get_json(
            "/youtube/v3/videos",
            &[
                ("part", "snippet,contentDetails,statistics"),
                ("chart", "mostPopular"),
                ("regionCode", region),
                ("maxResults", max.as_str()),
            ],
            key,
        )
        .await
    }

    pub async fn search(
        &self,
        key: &str,
        query: &str,
        max_results: u32,
    ) -> Result<ListResponse<SearchResult>, ApiError> {
        let max = clamp_max_results(max_results).to_string();
        self.get_json(
            "/youtube/v3/search",
            &[
                ("part", "snippet"),
                ("type", "video"),
                ("q", query),
                ("maxResults", max.as_str()),
            ],
            key,
        )
        .await
    }

    pub async fn video_statistics(
        &self,
        key: &str,
        video_id: &str,
    ) -> Result<ListResponse<Video>, ApiError> {
        self.get_json(
            "/youtube/v3/videos",
            &[("part", "statistics"), ("id", video_id)],
            key,
        )
        .await
    }

    pub async fn channel(&self, key: &str, channel_id: &str) -> Result<ListResponse<Channel>, ApiError> {
        self.get_json(
            "/youtube/v3/channels",
            &[("part", "snippet"), ("id", channel_id)],
            key,
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
        key: &str,
    ) -> Result<T, ApiError> {
        let url = build_url(&self.base, path, params, key);
        let log_level = runtime_config::get().log_level();
        if log_level.backend_enabled() {
            logging::backend_request("GET", &url);
        }

        let start = Instant::now();
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;

        if log_level.backend_enabled() {
            if log_level.raw_enabled() {
                logging::backend_response_raw(status.as_u16(), start.elapsed(), &bytes);
            } else {
                logging::backend_response(status.as_u16(), start.elapsed(), &bytes);
            }
        }

        if !status.is_success() {
            return Err(extract_error_details(status.as_u16(), &bytes));
        }
        Ok(sonic_rs::from_slice::<T>(&bytes)?)
    }
}

fn default_headers() -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(
        USER_AGENT,
        HeaderValue::from_static(concat!("tubegate/", env!("CARGO_PKG_VERSION"))),
    );
    h.insert(ACCEPT, HeaderValue::from_static("application/json"));
    h
}

pub fn clamp_max_results(v: u32) -> u32 {
    v.clamp(1, MAX_RESULTS_LIMIT)
}

fn build_url(base: &str, path: &str, params: &[(&str, &str)], key: &str) -> String {
    let mut url = format!("{base}{path}?");
    for (k, v) in params {
        url.push_str(k);
        url.push('=');
        url.push_str(&urlencoding::encode(v));
        url.push('&');
    }
    url.push_str("key=");
    url.push_str(&urlencoding::encode(key));
    url
}

/// 解析 Google API 标准错误体：
/// `{"error":{"code":403,"message":"...","errors":[{"reason":"quotaExceeded",...}]}}`
fn extract_error_details(status: u16, body: &[u8]) -> ApiError {
    #[derive(Debug, serde::Deserialize)]
    struct ErrResp {
        error: ErrInner,
    }

    #[derive(Debug, serde::Deserialize)]
    struct ErrInner {
        #[serde(default)]
        message: String,
        #[serde(default)]
        errors: Vec<ErrItem>,
    }

    #[derive(Debug, serde::Deserialize)]
    struct ErrItem {
        #[serde(default)]
        reason: String,
    }

    match sonic_rs::from_slice::<ErrResp>(body) {
        Ok(resp) => {
            let reason = resp
                .error
                .errors
                .into_iter()
                .map(|e| e.reason)
                .find(|r| !r.is_empty())
                .unwrap_or_default();
            let message = if resp.error.message.is_empty() {
                "Unknown error".to_string()
            } else {
                resp.error.message
            };
            ApiError::Http {
                status,
                message,
                reason,
            }
        }
        Err(_) => ApiError::Http {
            status,
            message: String::from_utf8_lossy(body).chars().take(200).collect(),
            reason: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_encodes_params_and_appends_key() {
        let url = build_url(
            "https://www.googleapis.com",
            "/youtube/v3/search",
            &[("part", "snippet"), ("q", "lo-fi & chill")],
            "k1",
        );
        assert_eq!(
            url,
            "https://www.googleapis.com/youtube/v3/search?part=snippet&q=lo-fi%20%26%20chill&key=k1"
        );
    }

    #[test]
    fn extract_error_details_reads_reason() {
        let body = r#"{
            "error": {
                "code": 403,
                "message": "The request cannot be completed because you have exceeded your quota.",
                "errors": [
                    {
                        "message": "The request cannot be completed because you have exceeded your quota.",
                        "domain": "youtube.quota",
                        "reason": "quotaExceeded"
                    }
                ]
            }
        }"#;

        let err = extract_error_details(403, body.as_bytes());
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.reason(), Some("quotaExceeded"));
        assert!(err.to_string().contains("exceeded your quota"));
    }

    #[test]
    fn extract_error_details_tolerates_non_json() {
        let err = extract_error_details(502, b"<html>Bad Gateway</html>");
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.reason(), None);
    }

    #[test]
    fn max_results_is_clamped() {
        assert_eq!(clamp_max_results(0), 1);
        assert_eq!(clamp_max_results(24), 24);
        assert_eq!(clamp_max_results(500), 50);
    }
}
