//! 存储模块
//!
//! 提供译文缓存和节点标注侧表。

pub mod cache;
pub mod state;

pub use cache::{CacheKey, CacheStats, TranslationCache};
pub use state::{ClaimToken, NodeStates, ProcessingState};
