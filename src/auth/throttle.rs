use crate::auth::identity::LoginIdentity;
use crate::clock::Clock;
use crate::config::ThrottleConfig;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 两次常规清理之间的最小间隔；超过 key 上限时不受此限制
const CLEANUP_INTERVAL_MS: u64 = 60 * 1000;

/// 单个 key 的失败记录（时间均为毫秒时间戳）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptRecord {
    /// 当前窗口起点
    pub first_failure_at: u64,
    /// 最近一次失败，清理时按它判断陈旧与淘汰顺序
    pub last_failure_at: u64,
    /// 当前窗口内累计失败次数，触发封禁时归零
    pub failures: u32,
    /// 封禁截止时间，0 表示未封禁
    pub blocked_until: u64,
}

impl AttemptRecord {
    fn fresh(now: u64) -> Self {
        Self {
            first_failure_at: now,
            last_failure_at: now,
            failures: 1,
            blocked_until: 0,
        }
    }

    fn is_blocked(&self, now: u64) -> bool {
        self.blocked_until > now
    }

    /// 在已有记录（或无记录）上叠加一次失败，返回新记录
    fn after_failure(existing: Option<Self>, now: u64, window_ms: u64, block_ms: u64, threshold: u32) -> Self {
        let mut record = match existing {
            Some(prev) if now.saturating_sub(prev.first_failure_at) <= window_ms => Self {
                failures: prev.failures.saturating_add(1),
                last_failure_at: now,
                ..prev
            },
            _ => Self::fresh(now),
        };

        if record.failures >= threshold {
            // 封禁后窗口从此刻重新开始，封禁过期后不会立刻再次触发
            record.blocked_until = now.saturating_add(block_ms);
            record.first_failure_at = now;
            record.failures = 0;
        }

        record
    }
}

/// 限流检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleStatus {
    pub blocked: bool,
    pub retry_after_ms: u64,
    /// 向上取整，封禁时至少为 1
    pub retry_after_seconds: u64,
}

impl ThrottleStatus {
    fn from_blocked_until(blocked_until: u64, now: u64) -> Self {
        let retry_after_ms = blocked_until.saturating_sub(now);
        if retry_after_ms == 0 {
            return Self {
                blocked: false,
                retry_after_ms: 0,
                retry_after_seconds: 0,
            };
        }

        Self {
            blocked: true,
            retry_after_ms,
            retry_after_seconds: retry_after_ms.div_ceil(1000).max(1),
        }
    }
}

/// 一次清理的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub stale_removed: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThrottleStats {
    pub tracked_keys: usize,
    pub blocked_keys: usize,
    pub max_tracked_keys: usize,
}

/// 登录防爆破：按 IP 和 (ip, client, username) 两个维度统计失败次数
///
/// 每个公开方法开头都会顺带检查是否需要清理，不依赖后台定时任务。
/// 同一个 key 的“读-判断-写”在 DashMap 的 entry 锁内完成，并发失败不会少计。
pub struct LoginThrottle {
    attempts: DashMap<String, AttemptRecord>,
    last_cleanup_at: AtomicU64,
    cfg: ThrottleConfig,
    clock: Arc<dyn Clock>,
}

impl LoginThrottle {
    pub fn new(cfg: ThrottleConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            attempts: DashMap::new(),
            last_cleanup_at: AtomicU64::new(0),
            cfg,
            clock,
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.cfg
    }

    /// 登录前检查：取 IP key 和用户 key 中较晚的封禁截止时间
    pub fn status(&self, identity: &LoginIdentity) -> ThrottleStatus {
        let now = self.clock.now_ms();
        self.cleanup_if_due(now);

        let blocked_until = self
            .blocked_until(&identity.ip_key())
            .max(self.blocked_until(&identity.user_key()));
        ThrottleStatus::from_blocked_until(blocked_until, now)
    }

    /// 密码校验失败后调用，返回值已经包含本次失败的影响
    pub fn record_failure(&self, identity: &LoginIdentity) -> ThrottleStatus {
        let now = self.clock.now_ms();
        self.cleanup_if_due(now);

        let ip_record = self.bump(identity.ip_key(), now, self.cfg.max_attempts_per_ip);
        let user_record = self.bump(identity.user_key(), now, self.cfg.max_attempts_per_user);

        ThrottleStatus::from_blocked_until(ip_record.blocked_until.max(user_record.blocked_until), now)
    }

    /// 登录成功后清除该身份的 IP 记录和用户记录，key 不存在时什么也不做
    pub fn clear(&self, identity: &LoginIdentity) {
        let now = self.clock.now_ms();
        self.cleanup_if_due(now);

        let ip_removed = self.attempts.remove(&identity.ip_key()).is_some();
        let user_removed = self.attempts.remove(&identity.user_key()).is_some();
        if ip_removed || user_removed {
            tracing::debug!(
                ip = identity.ip(),
                username = identity.username(),
                "登录成功，清除失败记录"
            );
        }
    }

    pub fn stats(&self) -> ThrottleStats {
        let now = self.clock.now_ms();
        self.cleanup_if_due(now);

        let blocked_keys = self
            .attempts
            .iter()
            .filter(|entry| entry.value().is_blocked(now))
            .count();

        ThrottleStats {
            tracked_keys: self.attempts.len(),
            blocked_keys,
            max_tracked_keys: self.cfg.max_tracked_keys,
        }
    }

    /// 距上次清理超过间隔，或者 key 数已经超过上限时才真正执行清理
    pub fn cleanup_if_due(&self, now: u64) -> Option<CleanupReport> {
        let last = self.last_cleanup_at.load(Ordering::Acquire);
        let interval_due = now.saturating_sub(last) >= CLEANUP_INTERVAL_MS;
        if !interval_due && self.attempts.len() <= self.cfg.max_tracked_keys {
            return None;
        }

        // 只让抢到游标的线程执行本轮清理
        if self
            .last_cleanup_at
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let report = self.cleanup(now);
        if report.stale_removed > 0 || report.evicted > 0 {
            tracing::debug!(
                stale_removed = report.stale_removed,
                evicted = report.evicted,
                remaining = self.attempts.len(),
                "登录限流清理完成"
            );
        }
        Some(report)
    }

    /// 先删除未封禁且长期无活动的记录，仍超过上限时按 last_failure_at 从旧到新强制淘汰
    pub fn cleanup(&self, now: u64) -> CleanupReport {
        let stale_after_ms = self.cfg.window_ms.max(self.cfg.block_ms).saturating_mul(2);

        let before = self.attempts.len();
        self.attempts.retain(|_, record| {
            record.is_blocked(now) || now.saturating_sub(record.last_failure_at) <= stale_after_ms
        });
        let stale_removed = before.saturating_sub(self.attempts.len());

        let overflow = self.attempts.len().saturating_sub(self.cfg.max_tracked_keys);
        let mut evicted = 0;
        if overflow > 0 {
            // 上限优先于封禁状态，防止大量不同 key 撑爆内存
            let mut by_age: Vec<(u64, String)> = self
                .attempts
                .iter()
                .map(|entry| (entry.value().last_failure_at, entry.key().clone()))
                .collect();
            by_age.sort_unstable();

            for (_, key) in by_age.into_iter().take(overflow) {
                if self.attempts.remove(&key).is_some() {
                    evicted += 1;
                }
            }

            tracing::warn!(
                evicted,
                max_tracked_keys = self.cfg.max_tracked_keys,
                "登录限流记录超过上限，已淘汰最旧的记录"
            );
        }

        CleanupReport { stale_removed, evicted }
    }

    fn blocked_until(&self, key: &str) -> u64 {
        self.attempts
            .get(key)
            .map(|record| record.blocked_until)
            .unwrap_or(0)
    }

    fn bump(&self, key: String, now: u64, threshold: u32) -> AttemptRecord {
        let (window_ms, block_ms) = (self.cfg.window_ms, self.cfg.block_ms);

        match self.attempts.entry(key) {
            Entry::Occupied(mut entry) => {
                let next = AttemptRecord::after_failure(Some(*entry.get()), now, window_ms, block_ms, threshold);
                if next.failures == 0 {
                    tracing::warn!(key = %entry.key(), block_ms, "登录失败次数达到阈值，开始封禁");
                }
                *entry.get_mut() = next;
                next
            }
            Entry::Vacant(entry) => {
                let next = AttemptRecord::after_failure(None, now, window_ms, block_ms, threshold);
                if next.failures == 0 {
                    tracing::warn!(key = %entry.key(), block_ms, "登录失败次数达到阈值，开始封禁");
                }
                entry.insert(next);
                next
            }
        }
    }

    #[cfg(test)]
    fn record(&self, key: &str) -> Option<AttemptRecord> {
        self.attempts.get(key).map(|record| *record)
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.attempts.len()
    }
}
