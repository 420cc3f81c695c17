use crate::youtube::types::{Channel, SearchResult, Snippet, Video};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendingQuery {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub max_results: Option<u32>,
}

/// 前端视频卡片需要的字段。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCard {
    pub id: String,
    pub title: String,
    pub channel_id: Option<String>,
    pub channel_title: String,
    pub description: String,
    pub published_at: Option<String>,
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
}

impl VideoCard {
    fn from_snippet(id: String, s: &Snippet) -> Self {
        Self {
            id,
            title: s.title.clone(),
            channel_id: s.channel_id.clone(),
            channel_title: s.channel_title.clone(),
            description: s.description.clone(),
            published_at: s.published_at.clone(),
            thumbnail_url: s.thumbnails.card_url().map(str::to_string),
            view_count: None,
            duration_seconds: None,
        }
    }

    /// 没有 snippet 的条目无法展示，返回 None。
    pub fn from_video(v: &Video) -> Option<Self> {
        let snippet = v.snippet.as_ref()?;
        let mut card = Self::from_snippet(v.id.clone(), snippet);
        card.view_count = v.statistics.as_ref().and_then(|s| s.views());
        card.duration_seconds = v.content_details.as_ref().and_then(|c| c.duration_seconds());
        Some(card)
    }

    /// 只保留真正的视频结果（有 videoId）。
    pub fn from_search(r: &SearchResult) -> Option<Self> {
        let id = r.id.video_id.as_ref().filter(|id| !id.is_empty())?;
        let snippet = r.snippet.as_ref()?;
        Some(Self::from_snippet(id.clone(), snippet))
    }
}

#[derive(Debug, Serialize)]
pub struct ItemsResponse<T> {
    pub items: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsView {
    pub id: String,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
}

impl StatisticsView {
    pub fn from_video(v: &Video) -> Self {
        let stats = v.statistics.clone().unwrap_or_default();
        Self {
            id: v.id.clone(),
            view_count: stats.views(),
            like_count: stats.likes(),
            comment_count: stats.comments(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelView {
    pub id: String,
    pub title: String,
    pub icon_url: Option<String>,
}

impl ChannelView {
    pub fn from_channel(c: &Channel) -> Self {
        let snippet = c.snippet.clone().unwrap_or_default();
        Self {
            id: c.id.clone(),
            title: snippet.title,
            icon_url: snippet.thumbnails.icon_url().map(str::to_string),
        }
    }
}
