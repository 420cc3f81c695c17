use crate::credential::dispatcher::KeyDispatcher;
use crate::credential::store::Store;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// 单次检查的等待上下限。
const MIN_SLEEP: Duration = Duration::from_secs(1);
const MAX_SLEEP: Duration = Duration::from_secs(30 * 60);

/// 启动每日重置任务。
///
/// - 距上次重置超过 `window`（或从未重置）：清空失败集合与本窗口配额消耗，并记录重置时间
/// - 否则仅把当前失败集合落盘，重启后可恢复
pub fn spawn_daily_reset_task(
    dispatcher: Arc<KeyDispatcher>,
    store: Arc<Store>,
    window: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let sleep_duration = match run_cycle(&dispatcher, &store, window, Utc::now()).await {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(error = ?e, "每日重置任务执行失败");
                    Duration::from_secs(60)
                }
            };

            let sleep_duration = sleep_duration.clamp(MIN_SLEEP, MAX_SLEEP);
            tracing::debug!("下次 key 重置检查将在 {:?} 后", sleep_duration);
            tokio::time::sleep(sleep_duration).await;
        }
    })
}

/// 执行一次检查，返回距离下次应重置的时间。
async fn run_cycle(
    dispatcher: &KeyDispatcher,
    store: &Store,
    window: Duration,
    now: DateTime<Utc>,
) -> anyhow::Result<Duration> {
    let last_reset = store.snapshot().await.last_reset();

    if reset_due(last_reset, now, window) {
        dispatcher.reset_failures().await;
        dispatcher.reset_usage().await;
        store.mark_reset(now).await?;
        tracing::info!("已完成每日 API key 重置");
        return Ok(window);
    }

    store.save_failures(&dispatcher.failed_indices().await).await?;
    Ok(time_until_due(last_reset, now, window))
}

fn reset_due(last_reset: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> bool {
    let Some(last) = last_reset else {
        return true;
    };
    // 时钟回拨时 elapsed 为负，视为未到期。
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    elapsed >= window
}

fn time_until_due(last_reset: Option<DateTime<Utc>>, now: DateTime<Utc>, window: Duration) -> Duration {
    let Some(last) = last_reset else {
        return Duration::ZERO;
    };
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    window.saturating_sub(elapsed)
}
