//! 聊天消息实时翻译
//!
//! 在一棵不断变化的文档树中找到聊天消息，把文本送去翻译服务，
//! 再把译文写回原处并打上标记：
//! - **core**: 处理引擎、翻译服务提供者、变更监视器和翻译器服务
//! - **pipeline**: 消息识别、文本提取与过滤
//! - **storage**: 译文缓存与节点处理状态
//! - **config**: 配置管理
//! - **error**: 错误处理
//!
//! # 基本用法
//!
//! ```rust,no_run
//! use std::rc::Rc;
//! use chat_translator::host::{control_channel, LiveDocument, PreferenceStore, Preferences};
//! use chat_translator::translation::{ChatTranslator, ConfigManager, HttpTranslationProvider};
//!
//! # async fn example(html: &[u8]) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConfigManager::new()?.into_config();
//! let document = LiveDocument::parse(html, "utf-8");
//! let preferences = Rc::new(PreferenceStore::in_memory(Preferences::default()));
//! let provider = Rc::new(HttpTranslationProvider::new(&config)?);
//!
//! let translator = ChatTranslator::new(document, preferences, provider, &config)?;
//! let (control, receiver) = control_channel();
//! tokio::task::spawn_local(translator.clone().run(receiver));
//! control.reload_settings().await?;
//! # Ok(())
//! # }
//! ```

/// 配置管理模块
pub mod config;

/// 核心模块 - 引擎、提供者、监视器和服务
pub mod core;

/// 错误处理模块 - 统一的错误类型和处理机制
pub mod error;

/// 文本处理管道模块 - 消息识别、提取和过滤
pub mod pipeline;

/// 存储模块 - 译文缓存与节点状态
pub mod storage;

pub use self::core::{
    ChatTranslator, EngineStatsSnapshot, HttpTranslationProvider, MutationWatcher, ProcessOutcome,
    ScanReport, SkipReason, TextApplier, TranslationEngine, TranslationProvider, TranslatorStats,
    WatcherConfig,
};

pub use config::{constants, signatures, ConfigManager, TranslatorConfig};

pub use error::{ErrorCategory, ErrorSeverity, TranslationError, TranslationResult};

pub use pipeline::{Classification, MessageClassifier, TextExtractor, TextFilter};

pub use storage::{CacheKey, CacheStats, ClaimToken, NodeStates, ProcessingState, TranslationCache};
