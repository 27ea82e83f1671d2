//! 翻译服务
//!
//! [`ChatTranslator`] 把偏好设置、控制通道和变更监视器接在一起：
//!
//! - 目标语言变化：清空缓存，恢复已翻译节点的原文，然后重新扫描
//! - 关闭翻译：停止监视器并释放订阅；重新开启时重新查找容器并扫描
//! - `reloadSettings` 命令：重新读取偏好，清空缓存与状态，全量重扫
//!
//! ## 使用示例
//!
//! ```no_run
//! use std::rc::Rc;
//! use chat_translator::host::{control_channel, LiveDocument, PreferenceStore, Preferences};
//! use chat_translator::translation::{ChatTranslator, HttpTranslationProvider, TranslatorConfig};
//!
//! # async fn demo(html: &[u8]) -> chat_translator::translation::TranslationResult<()> {
//! let config = TranslatorConfig::default();
//! let document = LiveDocument::parse(html, "utf-8");
//! let preferences = Rc::new(PreferenceStore::in_memory(Preferences::default()));
//! let provider = Rc::new(HttpTranslationProvider::new(&config)?);
//!
//! let translator = ChatTranslator::new(document, preferences, provider, &config)?;
//! let (_control, receiver) = control_channel();
//! tokio::task::spawn_local(translator.clone().run(receiver));
//! # Ok(())
//! # }
//! ```

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::host::control::{ControlCommand, ControlReceiver, ControlResponse};
use crate::host::document::LiveDocument;
use crate::host::preferences::{PreferenceChanges, PreferenceStore};
use crate::translation::config::TranslatorConfig;
use crate::translation::core::engine::{EngineStatsSnapshot, TranslationEngine};
use crate::translation::core::provider::TranslationProvider;
use crate::translation::core::watcher::{MutationWatcher, WatcherConfig};
use crate::translation::error::{helpers::log_error, ErrorStats, TranslationError, TranslationResult};
use crate::translation::storage::CacheStats;

/// 服务运行统计
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatorStats {
    pub engine: EngineStatsSnapshot,
    pub cache: CacheStats,
    pub errors: ErrorStats,
    pub watcher_running: bool,
    pub observers: usize,
}

/// 聊天翻译器
pub struct ChatTranslator {
    document: Rc<LiveDocument>,
    preferences: Rc<PreferenceStore>,
    engine: Rc<TranslationEngine>,
    watcher: Rc<MutationWatcher>,
    startup_delay: Duration,
    changes: RefCell<Option<mpsc::UnboundedReceiver<PreferenceChanges>>>,
}

impl ChatTranslator {
    pub fn new(
        document: Rc<LiveDocument>,
        preferences: Rc<PreferenceStore>,
        provider: Rc<dyn TranslationProvider>,
        config: &TranslatorConfig,
    ) -> TranslationResult<Rc<Self>> {
        config.validate()?;

        let engine = Rc::new(TranslationEngine::new(preferences.clone(), provider, config)?);
        let watcher = MutationWatcher::new(document.clone(), engine.clone(), WatcherConfig::from(config));
        // 构造时就订阅，启动延迟期间的变更不会丢失
        let changes = preferences.on_change();

        Ok(Rc::new(Self {
            document,
            preferences,
            engine,
            watcher,
            startup_delay: config.startup_delay(),
            changes: RefCell::new(Some(changes)),
        }))
    }

    /// 事件循环：等待启动延迟，按偏好启动监视器，然后处理偏好变化与控制命令。
    /// 控制通道关闭后停止监视器并返回。
    pub async fn run(self: Rc<Self>, mut control: ControlReceiver) -> TranslationResult<()> {
        let mut changes = self
            .changes
            .borrow_mut()
            .take()
            .ok_or_else(|| TranslationError::InternalError("翻译器已在运行".to_string()))?;

        tokio::time::sleep(self.startup_delay).await;

        if self.preferences.is_enabled() {
            self.watcher.start();
        } else {
            tracing::info!("翻译已关闭，等待开启");
        }

        loop {
            tokio::select! {
                Some(change) = changes.recv() => {
                    self.apply_preference_changes(&change);
                }
                request = control.recv() => {
                    let Some(request) = request else {
                        tracing::info!("控制通道已关闭，停止翻译器");
                        break;
                    };
                    let response = self.handle_command(&request.command);
                    if request.reply.send(response).is_err() {
                        tracing::debug!("控制命令的发送方已放弃等待回执");
                    }
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// 响应偏好变化
    pub fn apply_preference_changes(&self, changes: &PreferenceChanges) {
        if let Some((old, new)) = &changes.target_language {
            tracing::info!("目标语言 {} -> {}", old, new);
            if self.watcher.is_running() {
                self.spawn_reset_and_rescan();
            } else {
                self.watcher.reset();
            }
        }

        if let Some((_, enabled)) = changes.enabled {
            if enabled {
                self.watcher.start();
            } else {
                self.watcher.stop();
            }
        }
    }

    /// 处理控制命令
    pub fn handle_command(&self, command: &ControlCommand) -> ControlResponse {
        match command {
            ControlCommand::ReloadSettings => match self.reload_settings() {
                Ok(()) => ControlResponse::ok(),
                Err(e) => {
                    log_error(&e);
                    ControlResponse::failed()
                }
            },
        }
    }

    /// 重新读取偏好，清空缓存与状态并全量重扫。
    /// 读到的偏好差异照常经由变更通知处理。
    pub fn reload_settings(&self) -> TranslationResult<()> {
        self.preferences.reload()?;

        if self.preferences.is_enabled() {
            self.spawn_reset_and_rescan();
        } else {
            self.watcher.reset();
        }
        Ok(())
    }

    /// 停止监视器
    pub fn shutdown(&self) {
        self.watcher.stop();
    }

    pub fn document(&self) -> &Rc<LiveDocument> {
        &self.document
    }

    pub fn engine(&self) -> &Rc<TranslationEngine> {
        &self.engine
    }

    pub fn watcher(&self) -> &Rc<MutationWatcher> {
        &self.watcher
    }

    pub fn stats(&self) -> TranslatorStats {
        TranslatorStats {
            engine: self.engine.stats(),
            cache: self.engine.cache().stats(),
            errors: self.watcher.error_stats(),
            watcher_running: self.watcher.is_running(),
            observers: self.document.observer_count(),
        }
    }

    /// 立即重置，稍后重扫
    fn spawn_reset_and_rescan(&self) {
        self.watcher.reset();
        self.watcher.schedule_rescan();
    }
}
