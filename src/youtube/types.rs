//! YouTube Data API v3 响应结构。
//!
//! 远端字段几乎都可能缺失，这里全部显式声明为 `Option` 或带默认值，
//! 缺失的情况由调用方明确处理，而不是假设字段一定存在。

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub page_info: Option<PageInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub total_results: Option<u64>,
    #[serde(default)]
    pub results_per_page: Option<u32>,
}

/// `videos.list` 的条目：id 是字符串。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<Snippet>,
    #[serde(default)]
    pub content_details: Option<ContentDetails>,
    #[serde(default)]
    pub statistics: Option<Statistics>,
}

/// `search.list` 的条目：id 是对象，只有 `kind == youtube#video` 时才带 videoId。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: SearchId,
    #[serde(default)]
    pub snippet: Option<Snippet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchId {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub video_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub channel_title: String,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnails {
    #[serde(default)]
    pub default: Option<Thumbnail>,
    #[serde(default)]
    pub medium: Option<Thumbnail>,
    #[serde(default)]
    pub high: Option<Thumbnail>,
}

impl Thumbnails {
    /// 视频卡片用：medium → default。
    pub fn card_url(&self) -> Option<&str> {
        self.medium
            .as_ref()
            .or(self.default.as_ref())
            .map(|t| t.url.as_str())
            .filter(|u| !u.is_empty())
    }

    /// 频道头像用：default → medium → high。
    pub fn icon_url(&self) -> Option<&str> {
        self.default
            .as_ref()
            .or(self.medium.as_ref())
            .or(self.high.as_ref())
            .map(|t| t.url.as_str())
            .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Thumbnail {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentDetails {
    /// ISO 8601 时长，例如 `PT4M13S`。
    #[serde(default)]
    pub duration: Option<String>,
}

impl ContentDetails {
    pub fn duration_seconds(&self) -> Option<u64> {
        parse_iso8601_duration(self.duration.as_deref()?)
    }
}

/// 计数在 API 里是十进制字符串。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde(default)]
    pub view_count: Option<String>,
    #[serde(default)]
    pub like_count: Option<String>,
    #[serde(default)]
    pub comment_count: Option<String>,
}

impl Statistics {
    pub fn views(&self) -> Option<u64> {
        parse_count(self.view_count.as_deref())
    }

    pub fn likes(&self) -> Option<u64> {
        parse_count(self.like_count.as_deref())
    }

    pub fn comments(&self) -> Option<u64> {
        parse_count(self.comment_count.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<ChannelSnippet>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelSnippet {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thumbnails: Thumbnails,
}

fn parse_count(v: Option<&str>) -> Option<u64> {
    v?.trim().parse().ok()
}

/// 只处理 YouTube 实际返回的 `P[nD]T[nH][nM][nS]` 形式。
fn parse_iso8601_duration(s: &str) -> Option<u64> {
    let rest = s.trim().strip_prefix('P')?;
    let mut total = 0u64;
    let mut num = String::new();
    let mut in_time = false;
    let mut any = false;

    for ch in rest.chars() {
        match ch {
            'T' if !in_time && num.is_empty() => in_time = true,
            '0'..='9' => num.push(ch),
            unit => {
                let n: u64 = num.parse().ok()?;
                num.clear();
                let mul = match (in_time, unit) {
                    (false, 'D') => 86_400,
                    (false, 'W') => 7 * 86_400,
                    (true, 'H') => 3_600,
                    (true, 'M') => 60,
                    (true, 'S') => 1,
                    _ => return None,
                };
                total = total.checked_add(n.checked_mul(mul)?)?;
                any = true;
            }
        }
    }

    if !num.is_empty() || !any {
        return None;
    }
    Some(total)
}
