//! 翻译系统核心模块
//!
//! 把消息识别、文本提取、翻译调用和结果写回串成一条处理链，并负责
//! 监视文档变化、响应偏好变化与控制命令。
//!
//! ## 模块依赖关系
//!
//! ```text
//! ChatTranslator (service.rs)
//!     ├── PreferenceStore (host/preferences.rs)
//!     └── MutationWatcher (watcher.rs)
//!             └── TranslationEngine (engine.rs)
//!                     ├── MessageClassifier / TextExtractor / TextFilter (pipeline)
//!                     ├── TranslationCache / NodeStates (storage)
//!                     ├── TranslationProvider (provider.rs)
//!                     └── TextApplier (applier.rs)
//! ```

pub mod applier;
pub mod engine;
pub mod provider;
pub mod service;
pub mod watcher;

pub use applier::TextApplier;
pub use engine::{EngineStatsSnapshot, ProcessOutcome, SkipReason, TranslationEngine};
pub use provider::{parse_translation_response, HttpTranslationProvider, TranslationProvider};
pub use service::{ChatTranslator, TranslatorStats};
pub use watcher::{MutationWatcher, ScanReport, WatcherConfig};
