//! API key 轮换与配额感知分发器。
//!
//! - 轮询：严格按池内顺序，游标单调前进（取模）。
//! - 失败跳过：调用方回报 403 的 key 进入失败集合，分发时跳过。
//! - 全部失败时 fail-open：清空失败集合并从 0 号重新开始，保证不会永久锁死。
//! - 全局节流：任意两次分发之间至少间隔 `min_interval`，与使用哪个 key 无关。
//! - 配额预算（可选）：单次调用成本会超出某个 key 剩余预算时，提前轮换到下一个 key。

use crate::credential::types::{Credential, KeyStats, LedgerEntry, OperationKind, QuotaCostTable};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("API key 池为空：至少需要配置一个 key")]
    EmptyPool,
}

pub struct KeyDispatcher {
    keys: Vec<Arc<str>>,
    min_interval: Duration,
    costs: QuotaCostTable,
    quota_budget: Option<u64>,
    // 节流闸门：持有期间完成等待，保证合并后的分发流满足最小间隔。
    gate: Mutex<Option<Instant>>,
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    cursor: usize,
    last_dispatched: Option<usize>,
    ledger: HashMap<usize, LedgerEntry>,
    failed: BTreeSet<usize>,
}

impl KeyDispatcher {
    pub fn new<I, S>(keys: I, min_interval: Duration) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut pool: Vec<Arc<str>> = Vec::new();
        for k in keys {
            let k = k.as_ref().trim();
            if k.is_empty() {
                continue;
            }
            if !seen.insert(k.to_string()) {
                tracing::warn!("忽略重复的 API key（第 {} 个之后）", pool.len());
                continue;
            }
            pool.push(Arc::from(k));
        }
        if pool.is_empty() {
            return Err(DispatchError::EmptyPool);
        }

        Ok(Self {
            keys: pool,
            min_interval,
            costs: QuotaCostTable::default(),
            quota_budget: None,
            gate: Mutex::new(None),
            state: Mutex::new(State::default()),
        })
    }

    /// 启用配额预算：`budget` 为每个 key 在一个重置窗口内可消耗的单位数，0 表示不限制。
    pub fn with_quota(mut self, costs: QuotaCostTable, budget: u64) -> Self {
        self.costs = costs;
        self.quota_budget = (budget > 0).then_some(budget);
        self
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// 获取下一个可用 key（不计配额成本）。
    pub async fn acquire(&self) -> Credential {
        self.acquire_with_cost(0).await
    }

    /// 获取下一个可用 key，并按操作类别计入配额消耗。
    pub async fn acquire_for(&self, kind: OperationKind) -> Credential {
        self.acquire_with_cost(self.costs.cost(kind)).await
    }

    async fn acquire_with_cost(&self, cost: u64) -> Credential {
        let mut gate = self.gate.lock().await;
        if let Some(last) = *gate {
            let ready_at = last + self.min_interval;
            if Instant::now() < ready_at {
                tokio::time::sleep_until(ready_at).await;
            }
        }

        let cred = {
            let mut state = self.state.lock().await;
            let idx = match self.select(&state, cost) {
                Some(idx) => idx,
                None => {
                    tracing::warn!(
                        failed = state.failed.len(),
                        total = self.keys.len(),
                        "所有 API key 均已失败，重置失败列表"
                    );
                    state.failed.clear();
                    0
                }
            };

            state.last_dispatched = Some(idx);
            state.cursor = (idx + 1) % self.keys.len();
            let entry = state.ledger.entry(idx).or_default();
            entry.usage_count += 1;
            entry.units_spent = entry.units_spent.saturating_add(cost);
            entry.last_used_at = Some(Utc::now());

            tracing::debug!(
                key_index = idx,
                total = self.keys.len(),
                usage = entry.usage_count,
                units = entry.units_spent,
                "分发 API key"
            );

            Credential {
                index: idx,
                key: self.keys[idx].clone(),
            }
        };

        *gate = Some(Instant::now());
        cred
    }

    /// 从游标开始最多扫描一整圈。
    ///
    /// 优先选未失败且预算足够的 key；预算全部不足时退化为只跳过失败 key。
    fn select(&self, state: &State, cost: u64) -> Option<usize> {
        let n = self.keys.len();
        let order = || (0..n).map(move |off| (state.cursor + off) % n);
        let healthy = |idx: &usize| !state.failed.contains(idx);

        if let Some(budget) = self.quota_budget {
            let fits = |idx: &usize| {
                let spent = state.ledger.get(idx).map(|e| e.units_spent).unwrap_or(0);
                spent.saturating_add(cost) <= budget
            };
            if let Some(idx) = order().find(|i| healthy(i) && fits(i)) {
                return Some(idx);
            }
            tracing::debug!(cost, budget, "所有可用 key 的剩余配额不足，按普通轮询分发");
        }

        order().find(healthy)
    }

    /// 标记 key 失败（通常是远端返回 403）。重复回报无副作用；越界索引被忽略。
    ///
    /// 返回失败集合是否发生变化。
    pub async fn report_failure(&self, index: usize) -> bool {
        if index >= self.keys.len() {
            tracing::warn!(key_index = index, total = self.keys.len(), "忽略越界的失败回报");
            return false;
        }
        let mut state = self.state.lock().await;
        let inserted = state.failed.insert(index);
        if inserted {
            tracing::warn!(
                key_index = index,
                failed = ?state.failed,
                "API key 已标记为失败"
            );
        }
        inserted
    }

    /// key 在池中的序号。
    pub fn index_of(&self, key: &str) -> Option<usize> {
        let key = key.trim();
        self.keys.iter().position(|k| k.as_ref() == key)
    }

    /// 按 key 内容回报失败。
    pub async fn report_failure_key(&self, key: &str) -> bool {
        match self.index_of(key) {
            Some(idx) => self.report_failure(idx).await,
            None => {
                tracing::warn!("忽略未知 key 的失败回报");
                false
            }
        }
    }

    /// 手动轮换：游标前进一位并返回新的当前 key。不经过失败跳过与节流。
    pub async fn force_rotate(&self) -> Credential {
        let mut state = self.state.lock().await;
        state.cursor = (state.cursor + 1) % self.keys.len();
        let idx = state.cursor;
        tracing::info!(key_index = idx, "手动轮换 API key");
        Credential {
            index: idx,
            key: self.keys[idx].clone(),
        }
    }

    pub async fn reset_failures(&self) {
        let mut state = self.state.lock().await;
        let cleared = state.failed.len();
        state.failed.clear();
        tracing::info!(cleared, "已重置失败 key 列表");
    }

    /// 清空本窗口内的配额消耗；累计调用次数保留。
    pub async fn reset_usage(&self) {
        let mut state = self.state.lock().await;
        for entry in state.ledger.values_mut() {
            entry.units_spent = 0;
        }
    }

    /// 恢复持久化的失败集合（越界索引丢弃）。
    pub async fn restore_failures(&self, indices: &[usize]) {
        let n = self.keys.len();
        let mut state = self.state.lock().await;
        state
            .failed
            .extend(indices.iter().copied().filter(|&i| i < n));
    }

    pub async fn stats(&self) -> Vec<KeyStats> {
        let state = self.state.lock().await;
        self.keys
            .iter()
            .enumerate()
            .map(|(i, k)| {
                let entry = state.ledger.get(&i).cloned().unwrap_or_default();
                KeyStats {
                    index: i,
                    key: crate::credential::types::mask_key(k),
                    usage_count: entry.usage_count,
                    units_spent: entry.units_spent,
                    is_failed: state.failed.contains(&i),
                    last_used_at: entry.last_used_at,
                }
            })
            .collect()
    }

    pub async fn available_count(&self) -> usize {
        let state = self.state.lock().await;
        self.keys.len() - state.failed.len()
    }

    pub async fn current_index(&self) -> usize {
        self.state.lock().await.cursor
    }

    pub async fn last_dispatched(&self) -> Option<usize> {
        self.state.lock().await.last_dispatched
    }

    pub async fn failed_indices(&self) -> Vec<usize> {
        self.state.lock().await.failed.iter().copied().collect()
    }
}

impl std::fmt::Debug for KeyDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyDispatcher")
            .field("key_count", &self.keys.len())
            .field("min_interval", &self.min_interval)
            .field("quota_budget", &self.quota_budget)
            .finish()
    }
}
