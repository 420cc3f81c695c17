//! 运行时可动态修改的配置。
//!
//! 管理接口修改后立即生效。使用 ArcSwap 实现无锁读取，写入时替换整个快照。

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::config::{self, Config};
use crate::logging::LogLevel;

const LOG_LEVELS: [&str; 4] = ["off", "low", "medium", "high"];

/// 运行时配置快照。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// 调试日志级别
    pub debug: String,
    /// 热门视频默认地区
    pub default_region: String,
}

impl RuntimeSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            debug: normalize_debug(&cfg.debug),
            default_region: cfg.default_region.clone(),
        }
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::parse(&self.debug)
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            debug: "off".to_string(),
            default_region: "US".to_string(),
        }
    }
}

static RUNTIME_SETTINGS: std::sync::OnceLock<ArcSwap<RuntimeSettings>> =
    std::sync::OnceLock::new();

/// 初始化（在 main 中调用一次）。
pub fn init(cfg: &Config) {
    let settings = RuntimeSettings::from_config(cfg);
    let _ = RUNTIME_SETTINGS.set(ArcSwap::from_pointee(settings));
}

pub fn get() -> Arc<RuntimeSettings> {
    RUNTIME_SETTINGS
        .get()
        .map(|s| s.load_full())
        .unwrap_or_else(|| Arc::new(RuntimeSettings::default()))
}

pub fn update(new_settings: RuntimeSettings) {
    if let Some(store) = RUNTIME_SETTINGS.get() {
        store.store(Arc::new(new_settings));
    }
}

/// 管理接口可编辑的设置。
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPayload {
    #[serde(default)]
    pub debug: Option<String>,
    #[serde(default)]
    pub default_region: Option<String>,
}

impl SettingsPayload {
    pub fn from_runtime(rt: &RuntimeSettings) -> Self {
        Self {
            debug: Some(rt.debug.clone()),
            default_region: Some(rt.default_region.clone()),
        }
    }

    /// 合并到现有快照；未提供的字段保持不变。
    pub fn apply_to(&self, current: &RuntimeSettings) -> Result<RuntimeSettings, &'static str> {
        let mut next = current.clone();

        if let Some(debug) = &self.debug {
            let d = debug.trim().to_lowercase();
            let d = if d.is_empty() { "off".to_string() } else { d };
            if !LOG_LEVELS.contains(&d.as_str()) {
                return Err("debug 只能是 off/low/medium/high");
            }
            next.debug = d;
        }

        if let Some(region) = &self.default_region {
            next.default_region = config::normalize_region(Some(region))
                .ok_or("defaultRegion 必须是两位字母地区码")?;
        }

        Ok(next)
    }
}

fn normalize_debug(v: &str) -> String {
    let d = v.trim().to_lowercase();
    if LOG_LEVELS.contains(&d.as_str()) {
        d
    } else {
        "off".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_merges_only_provided_fields() {
        let cur = RuntimeSettings::default();
        let p = SettingsPayload {
            debug: Some("  HIGH ".to_string()),
            default_region: None,
        };
        let next = p.apply_to(&cur).unwrap();
        assert_eq!(next.debug, "high");
        assert_eq!(next.default_region, "US");
        assert_eq!(next.log_level(), LogLevel::High);
    }

    #[test]
    fn payload_rejects_invalid_values() {
        let cur = RuntimeSettings::default();
        let bad_debug = SettingsPayload {
            debug: Some("verbose".to_string()),
            default_region: None,
        };
        assert!(bad_debug.apply_to(&cur).is_err());

        let bad_region = SettingsPayload {
            debug: None,
            default_region: Some("Germany".to_string()),
        };
        assert!(bad_region.apply_to(&cur).is_err());
    }

    #[test]
    fn normalize_debug_falls_back_to_off() {
        assert_eq!(normalize_debug("Medium"), "medium");
        assert_eq!(normalize_debug("whatever"), "off");
    }
}
