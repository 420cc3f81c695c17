use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

const STATE_FILE_NAME: &str = "key_state.json";

/// 持久化的 key 状态：上次每日重置的时间 + 失败集合快照。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    #[serde(rename = "lastReset", default, skip_serializing_if = "Option::is_none")]
    pub last_reset_ms: Option<i64>,
    #[serde(default)]
    pub failed: Vec<usize>,
}

impl KeyState {
    pub fn last_reset(&self) -> Option<DateTime<Utc>> {
        self.last_reset_ms
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

/// `DATA_DIR/key_state.json` 的读写。
#[derive(Debug)]
pub struct Store {
    file_path: PathBuf,
    state: Mutex<KeyState>,
}

impl Store {
    pub fn new(data_dir: &str) -> Self {
        Self {
            file_path: PathBuf::from(data_dir).join(STATE_FILE_NAME),
            state: Mutex::new(KeyState::default()),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// 读取状态文件；文件不存在视为空状态，解析失败则清空内存状态并返回错误。
    pub async fn load(&self) -> anyhow::Result<KeyState> {
        let data = match tokio::fs::read(&self.file_path).await {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut state = self.state.lock().await;
                *state = KeyState::default();
                return Ok(state.clone());
            }
            Err(e) => return Err(e).context("读取 key_state.json 失败"),
        };

        let loaded: KeyState = match sonic_rs::from_slice(&data) {
            Ok(v) => v,
            Err(e) => {
                *self.state.lock().await = KeyState::default();
                return Err(anyhow!(e)).context("解析 key_state.json 失败");
            }
        };

        let mut state = self.state.lock().await;
        *state = loaded;
        Ok(state.clone())
    }

    pub async fn snapshot(&self) -> KeyState {
        self.state.lock().await.clone()
    }

    /// 记录一次每日重置：更新时间并清空失败快照。
    pub async fn mark_reset(&self, at: DateTime<Utc>) -> anyhow::Result<()> {
        let snapshot = {
            let mut state = self.state.lock().await;
            state.last_reset_ms = Some(at.timestamp_millis());
            state.failed.clear();
            state.clone()
        };
        self.save_snapshot(&snapshot).await
    }

    /// 仅在失败集合有变化时落盘。
    pub async fn save_failures(&self, failed: &[usize]) -> anyhow::Result<()> {
        let snapshot = {
            let mut state = self.state.lock().await;
            if state.failed == failed {
                return Ok(());
            }
            state.failed = failed.to_vec();
            state.clone()
        };
        self.save_snapshot(&snapshot).await
    }

    async fn save_snapshot(&self, state: &KeyState) -> anyhow::Result<()> {
        ensure_parent_dir(&self.file_path).await?;
        let data = sonic_rs::to_vec_pretty(state).context("序列化 key_state.json 失败")?;
        tokio::fs::write(&self.file_path, data)
            .await
            .context("写入 key_state.json 失败")
    }
}

async fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    let Some(dir) = path.parent() else {
        return Ok(());
    };
    tokio::fs::create_dir_all(dir)
        .await
        .context("创建数据目录失败")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_data_dir() -> PathBuf {
        std::env::temp_dir().join(format!("tubegate-test-{}", uuid::Uuid::new_v4().simple()))
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty_state() {
        let dir = temp_data_dir();
        let store = Store::new(dir.to_str().unwrap());
        let state = store.load().await.unwrap();
        assert_eq!(state, KeyState::default());
        assert!(state.last_reset().is_none());
    }

    #[tokio::test]
    async fn reset_and_failures_survive_reload() {
        let dir = temp_data_dir();
        let store = Store::new(dir.to_str().unwrap());
        let at = DateTime::<Utc>::from_timestamp_millis(1_760_000_000_000).unwrap();
        store.mark_reset(at).await.unwrap();
        store.save_failures(&[2, 5]).await.unwrap();

        let reloaded = Store::new(dir.to_str().unwrap());
        let state = reloaded.load().await.unwrap();
        assert_eq!(state.last_reset(), Some(at));
        assert_eq!(state.failed, vec![2, 5]);

        let raw = tokio::fs::read_to_string(reloaded.file_path()).await.unwrap();
        assert!(raw.contains("lastReset"));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = temp_data_dir();
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let store = Store::new(dir.to_str().unwrap());
        tokio::fs::write(store.file_path(), b"{not json").await.unwrap();

        assert!(store.load().await.is_err());
        assert_eq!(store.snapshot().await, KeyState::default());

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
