//! 翻译缓存模块
//!
//! 按 `(原文, 目标语言)` 缓存译文。缓存在一次会话内不淘汰，
//! 只在目标语言变化或全部重新翻译时清空。

use std::cell::RefCell;
use std::collections::HashMap;

/// 缓存键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub original_text: String,
    pub target_language: String,
}

impl CacheKey {
    pub fn new(original_text: impl Into<String>, target_language: impl Into<String>) -> Self {
        Self {
            original_text: original_text.into(),
            target_language: target_language.into(),
        }
    }
}

/// 缓存统计信息
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub total_entries: usize,
    pub clears: u64,
}

impl CacheStats {
    /// 命中率
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.total_requests as f64
        }
    }
}

/// 翻译缓存
///
/// 单线程使用，内部借用不会跨越 `.await`。
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: RefCell<HashMap<CacheKey, String>>,
    stats: RefCell<CacheStats>,
}

impl TranslationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询译文
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        let result = self.entries.borrow().get(key).cloned();

        let mut stats = self.stats.borrow_mut();
        stats.total_requests += 1;
        if result.is_some() {
            stats.cache_hits += 1;
            tracing::debug!("缓存命中: {} -> {}", key.original_text, key.target_language);
        } else {
            stats.cache_misses += 1;
        }

        result
    }

    /// 写入译文
    pub fn insert(&self, key: CacheKey, translated_text: String) {
        let mut entries = self.entries.borrow_mut();
        entries.insert(key, translated_text);
        self.stats.borrow_mut().total_entries = entries.len();
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// 清空缓存
    pub fn clear(&self) {
        let removed = {
            let mut entries = self.entries.borrow_mut();
            let removed = entries.len();
            entries.clear();
            removed
        };

        let mut stats = self.stats.borrow_mut();
        stats.total_entries = 0;
        stats.clears += 1;
        tracing::debug!("清空翻译缓存，共 {} 条", removed);
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.borrow().clone()
    }
}
