// 进行中提示登记
// 同一个键同时只允许一个提示框，其余调用方等待其结束后重新查询缓存

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

pub struct InFlight<K> {
    keys: Mutex<HashSet<K>>,
    finished: Condvar,
}

impl<K: Eq + Hash + Clone> InFlight<K> {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashSet::new()),
            finished: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<K>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 登记对 key 的提示
    ///
    /// 若已有其他调用方在提示同一个 key，则阻塞到其结束。
    /// `settled` 在持有登记锁时调用，返回 true 表示缓存已可用、无需再提示，此时返回 None。
    /// 提交结果时必须先写缓存、再释放登记（丢弃返回的 guard），否则等待方可能重复提示。
    pub fn acquire(&self, key: &K, mut settled: impl FnMut() -> bool) -> Option<InFlightGuard<'_, K>> {
        let mut keys = self.lock();
        loop {
            if settled() {
                return None;
            }
            if !keys.contains(key) {
                keys.insert(key.clone());
                return Some(InFlightGuard {
                    owner: self,
                    key: key.clone(),
                });
            }
            keys = self
                .finished
                .wait(keys)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, key: &K) -> bool {
        self.lock().contains(key)
    }
}

impl<K: Eq + Hash + Clone> Default for InFlight<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// 提示登记，丢弃时释放并唤醒等待方
pub struct InFlightGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a InFlight<K>,
    key: K,
}

impl<K: Eq + Hash + Clone> Drop for InFlightGuard<'_, K> {
    fn drop(&mut self) {
        self.owner.lock().remove(&self.key);
        self.owner.finished.notify_all();
    }
}
