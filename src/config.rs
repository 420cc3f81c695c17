use figment::Figment;
use figment::providers::Env;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_MIN_KEY_INTERVAL_MS: u64 = 200;
const DEFAULT_QUOTA_DAILY_LIMIT: u64 = 10_000;
const DEFAULT_RESET_WINDOW_HOURS: u64 = 24;
const DEFAULT_REGION: &str = "US";

pub const DEFAULT_YOUTUBE_API_BASE: &str = "https://www.googleapis.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,

    pub api_keys: Vec<String>,
    pub min_key_interval_ms: u64,
    pub quota_daily_limit: u64,
    pub reset_window_hours: u64,

    pub api_base: String,
    pub timeout_ms: u64,
    pub proxy: String,

    pub debug: String,
    pub data_dir: String,
    pub manager_token: String,
    pub default_region: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawEnv {
    #[serde(alias = "HOST")]
    host: Option<String>,
    #[serde(alias = "PORT")]
    port: Option<u16>,

    #[serde(alias = "YOUTUBE_API_KEYS")]
    youtube_api_keys: Option<String>,
    #[serde(alias = "MIN_KEY_INTERVAL_MS")]
    min_key_interval_ms: Option<u64>,
    #[serde(alias = "QUOTA_DAILY_LIMIT")]
    quota_daily_limit: Option<u64>,
    #[serde(alias = "RESET_WINDOW_HOURS")]
    reset_window_hours: Option<u64>,

    #[serde(alias = "YOUTUBE_API_BASE")]
    youtube_api_base: Option<String>,
    #[serde(alias = "TIMEOUT")]
    timeout: Option<u64>,
    #[serde(alias = "PROXY")]
    proxy: Option<String>,

    #[serde(alias = "DEBUG")]
    debug: Option<String>,
    #[serde(alias = "DATA_DIR")]
    data_dir: Option<String>,
    #[serde(alias = "MANAGER_TOKEN")]
    manager_token: Option<String>,
    #[serde(alias = "DEFAULT_REGION")]
    default_region: Option<String>,
}

impl Config {
    pub fn load() -> Self {
        load_dotenv();

        let raw = Figment::from(Env::raw())
            .extract::<RawEnv>()
            .unwrap_or_default();

        let mut cfg = Self::from_raw(raw);

        // 命令行覆盖：-debug <level>
        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            if arg == "-debug"
                && let Some(v) = args.next()
            {
                cfg.debug = v;
            }
        }

        cfg
    }

    fn from_raw(raw: RawEnv) -> Self {
        Self {
            host: raw.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: raw.port.unwrap_or(DEFAULT_PORT),
            api_keys: parse_keys(raw.youtube_api_keys.as_deref()),
            min_key_interval_ms: raw
                .min_key_interval_ms
                .unwrap_or(DEFAULT_MIN_KEY_INTERVAL_MS),
            quota_daily_limit: raw.quota_daily_limit.unwrap_or(DEFAULT_QUOTA_DAILY_LIMIT),
            reset_window_hours: raw
                .reset_window_hours
                .filter(|h| *h > 0)
                .unwrap_or(DEFAULT_RESET_WINDOW_HOURS),
            api_base: raw
                .youtube_api_base
                .map(|s| s.trim().trim_end_matches('/').to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_YOUTUBE_API_BASE.to_string()),
            timeout_ms: raw.timeout.unwrap_or(DEFAULT_TIMEOUT_MS),
            proxy: raw.proxy.unwrap_or_default(),
            debug: raw.debug.unwrap_or_else(|| "off".to_string()),
            data_dir: raw.data_dir.unwrap_or_else(|| "./data".to_string()),
            manager_token: raw.manager_token.unwrap_or_default(),
            default_region: normalize_region(raw.default_region.as_deref())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        }
    }

    pub fn min_key_interval(&self) -> Duration {
        Duration::from_millis(self.min_key_interval_ms)
    }

    pub fn reset_window(&self) -> Duration {
        Duration::from_secs(self.reset_window_hours.saturating_mul(60 * 60))
    }

    pub fn log_level(&self) -> crate::logging::LogLevel {
        crate::logging::LogLevel::parse(&self.debug)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_raw(RawEnv::default())
    }
}

/// key 列表：逗号、分号或空白分隔。
fn parse_keys(value: Option<&str>) -> Vec<String> {
    let Some(value) = value else {
        return Vec::new();
    };
    value
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// 地区码：两位字母，统一大写；不合法返回 None。
pub fn normalize_region(value: Option<&str>) -> Option<String> {
    let v = value?.trim();
    if v.len() == 2 && v.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(v.to_ascii_uppercase())
    } else {
        None
    }
}

fn load_dotenv() {
    let Some(dotenv_path) = find_dotenv_path() else {
        return;
    };

    let Ok(content) = std::fs::read_to_string(&dotenv_path) else {
        return;
    };

    for line in content.lines() {
        let Some((key, value)) = parse_dotenv_line(line) else {
            continue;
        };
        // 已由真实环境变量设置的值优先，.env 只补缺。
        if std::env::var_os(&key).is_some() {
            continue;
        }
        // Rust 2024：set_var 为 unsafe。启动阶段单线程调用，无并发读写环境变量。
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

fn find_dotenv_path() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    let mut dir: &Path = cwd.as_path();

    loop {
        let candidate = dir.join(".env");
        if candidate.is_file() {
            return Some(candidate);
        }

        // 到仓库根目录为止。
        if dir.join("Cargo.toml").is_file() || dir.join(".git").is_dir() {
            return None;
        }

        dir = match dir.parent() {
            Some(parent) if parent != dir => parent,
            _ => return None,
        };
    }
}

fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let mut line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    if let Some(rest) = line.strip_prefix("export ") {
        line = rest.trim_start();
    }

    let (key, raw) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }

    let raw = raw.trim();
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Some((key.to_string(), raw[1..raw.len() - 1].to_string()));
        }
    }

    Some((key.to_string(), strip_inline_comment(raw).to_string()))
}

fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'#' && (i == 0 || bytes[i - 1] == b' ' || bytes[i - 1] == b'\t') {
            return value[..i].trim_end();
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keys_accepts_mixed_separators() {
        assert_eq!(
            parse_keys(Some(" k1, k2;k3\n k4  ,, ")),
            vec!["k1", "k2", "k3", "k4"]
        );
        assert!(parse_keys(Some(" , ")).is_empty());
        assert!(parse_keys(None).is_empty());
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let cfg = Config::from_raw(RawEnv::default());
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.min_key_interval(), Duration::from_millis(200));
        assert_eq!(cfg.quota_daily_limit, 10_000);
        assert_eq!(cfg.reset_window(), Duration::from_secs(86_400));
        assert_eq!(cfg.api_base, DEFAULT_YOUTUBE_API_BASE);
        assert_eq!(cfg.default_region, "US");
        assert!(cfg.api_keys.is_empty());
    }

    #[test]
    fn raw_values_are_normalized() {
        let cfg = Config::from_raw(RawEnv {
            youtube_api_base: Some(" http://127.0.0.1:9000/ ".to_string()),
            reset_window_hours: Some(0),
            default_region: Some("gb".to_string()),
            ..RawEnv::default()
        });
        assert_eq!(cfg.api_base, "http://127.0.0.1:9000");
        assert_eq!(cfg.reset_window_hours, 24);
        assert_eq!(cfg.default_region, "GB");
    }

    #[test]
    fn huge_reset_window_saturates() {
        let cfg = Config::from_raw(RawEnv {
            reset_window_hours: Some(u64::MAX),
            ..RawEnv::default()
        });
        assert_eq!(cfg.reset_window(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn normalize_region_rejects_garbage() {
        assert_eq!(normalize_region(Some(" jp ")), Some("JP".to_string()));
        assert_eq!(normalize_region(Some("USA")), None);
        assert_eq!(normalize_region(Some("1A")), None);
        assert_eq!(normalize_region(None), None);
    }

    #[test]
    fn dotenv_lines_are_parsed() {
        assert_eq!(
            parse_dotenv_line("export YOUTUBE_API_KEYS=\"a,b\""),
            Some(("YOUTUBE_API_KEYS".to_string(), "a,b".to_string()))
        );
        assert_eq!(
            parse_dotenv_line("PORT=8080 # local"),
            Some(("PORT".to_string(), "8080".to_string()))
        );
        assert_eq!(
            parse_dotenv_line("TOKEN=abc#def"),
            Some(("TOKEN".to_string(), "abc#def".to_string()))
        );
        assert_eq!(parse_dotenv_line("# comment"), None);
        assert_eq!(parse_dotenv_line("=value"), None);
    }
}
