//! 翻译引擎核心实现
//!
//! 每条消息一个异步任务，按顺序经过：
//!
//! 1. **守卫**: 未启用、已认领、相邻节点已认领、不是消息、提取失败、聊天命令时跳过
//! 2. **认领**: 与守卫在同一同步步骤中置为 InFlight，中间没有挂起点
//! 3. **缓存**: 命中 `(原文, 目标语言)` 时直接应用
//! 4. **翻译**: 未命中时调用翻译服务；译文与原文相同或出错时释放节点
//! 5. **应用**: 改写文本并标记为 Done
//!
//! 翻译服务返回后会重新检查认领凭据与偏好：期间发生过重置、目标语言变化或被禁用时，
//! 迟到的结果被丢弃。重置后重新认领的节点只归新的任务所有，旧任务不会释放它。

use std::cell::Cell;
use std::rc::Rc;

use markup5ever_rcdom::Handle;

use crate::host::preferences::PreferenceStore;
use crate::translation::config::TranslatorConfig;
use crate::translation::core::applier::TextApplier;
use crate::translation::core::provider::TranslationProvider;
use crate::translation::error::{TranslationError, TranslationResult};
use crate::translation::pipeline::{Classification, MessageClassifier, TextExtractor, TextFilter};
use crate::translation::storage::{CacheKey, ClaimToken, NodeStates, ProcessingState, TranslationCache};

/// 跳过原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 翻译已关闭
    Disabled,
    /// 节点已处于 InFlight/Done，或相邻节点已被认领
    AlreadyClaimed,
    /// 分类结果不是单条消息
    NotAMessage,
    /// 聊天命令
    Command,
    /// 提取出的文本长度越界
    OutOfBounds,
}

/// 单个节点的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Skipped(SkipReason),
    Translated { from_cache: bool },
    /// 译文与原文相同
    AlreadyInTargetLanguage,
    /// 等待期间发生重置或偏好变化，结果被丢弃
    Discarded,
}

/// 引擎统计
///
/// 单线程使用，计数器用 `Cell` 即可。
#[derive(Debug, Default)]
pub struct EngineStats {
    processed: Cell<usize>,
    translated: Cell<usize>,
    cache_hits: Cell<usize>,
    provider_calls: Cell<usize>,
    provider_errors: Cell<usize>,
    apply_failures: Cell<usize>,
    skipped: Cell<usize>,
    discarded: Cell<usize>,
}

/// 统计快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStatsSnapshot {
    pub processed: usize,
    pub translated: usize,
    pub cache_hits: usize,
    pub provider_calls: usize,
    pub provider_errors: usize,
    pub apply_failures: usize,
    pub skipped: usize,
    pub discarded: usize,
}

impl EngineStats {
    fn bump(counter: &Cell<usize>) {
        counter.set(counter.get() + 1);
    }

    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            processed: self.processed.get(),
            translated: self.translated.get(),
            cache_hits: self.cache_hits.get(),
            provider_calls: self.provider_calls.get(),
            provider_errors: self.provider_errors.get(),
            apply_failures: self.apply_failures.get(),
            skipped: self.skipped.get(),
            discarded: self.discarded.get(),
        }
    }
}

/// 翻译引擎
pub struct TranslationEngine {
    preferences: Rc<PreferenceStore>,
    provider: Rc<dyn TranslationProvider>,
    classifier: MessageClassifier,
    extractor: TextExtractor,
    filter: TextFilter,
    applier: TextApplier,
    cache: TranslationCache,
    states: NodeStates,
    stats: EngineStats,
}

impl TranslationEngine {
    pub fn new(
        preferences: Rc<PreferenceStore>,
        provider: Rc<dyn TranslationProvider>,
        config: &TranslatorConfig,
    ) -> TranslationResult<Self> {
        Ok(Self {
            preferences,
            provider,
            classifier: MessageClassifier::from_config(config)?,
            extractor: TextExtractor::with_min_length(config.min_text_length)?,
            filter: TextFilter::from_config(config),
            applier: TextApplier::new()?,
            cache: TranslationCache::new(),
            states: NodeStates::new(),
            stats: EngineStats::default(),
        })
    }

    /// 处理单个候选节点
    pub async fn process(&self, node: &Handle) -> TranslationResult<ProcessOutcome> {
        EngineStats::bump(&self.stats.processed);

        // 守卫与认领之间不能有挂起点
        let (text, target_language, token) = match self.claim(node)? {
            Ok(claimed) => claimed,
            Err(reason) => {
                EngineStats::bump(&self.stats.skipped);
                tracing::trace!("跳过节点: {:?}", reason);
                return Ok(ProcessOutcome::Skipped(reason));
            }
        };

        let key = CacheKey::new(text.clone(), target_language.clone());
        if let Some(translated) = self.cache.get(&key) {
            EngineStats::bump(&self.stats.cache_hits);
            self.finish(node, token, &text, &translated)?;
            return Ok(ProcessOutcome::Translated { from_cache: true });
        }

        EngineStats::bump(&self.stats.provider_calls);
        let result = self.provider.translate(&text, &target_language).await;

        if !self.states.holds(node, token) {
            // 等待期间发生了重置，节点可能已被新的认领接管
            EngineStats::bump(&self.stats.discarded);
            tracing::debug!("认领已失效，丢弃迟到的 {} 译文", target_language);
            return Ok(ProcessOutcome::Discarded);
        }

        let preferences = self.preferences.get();
        if !preferences.enabled || preferences.target_language != target_language {
            self.states.release(node, token);
            EngineStats::bump(&self.stats.discarded);
            tracing::debug!("偏好已变化，丢弃 {} 的译文", target_language);
            return Ok(ProcessOutcome::Discarded);
        }

        let translated = match result {
            Ok(translated) => translated,
            Err(e) => {
                self.states.release(node, token);
                EngineStats::bump(&self.stats.provider_errors);
                return Err(e.with_context(format!("{} -> {}", self.provider.name(), target_language)));
            }
        };

        if translated == text {
            self.states.release(node, token);
            tracing::debug!("译文与原文相同，跳过");
            return Ok(ProcessOutcome::AlreadyInTargetLanguage);
        }

        self.cache.insert(key, translated.clone());
        self.finish(node, token, &text, &translated)?;
        Ok(ProcessOutcome::Translated { from_cache: false })
    }

    /// 清空缓存，恢复所有已翻译节点的原文，返回恢复的节点数
    pub fn reset(&self) -> usize {
        self.cache.clear();
        let nodes = self.states.reset_all();
        for node in &nodes {
            self.applier.revert(node);
        }
        tracing::info!("已重置 {} 个已翻译节点", nodes.len());
        nodes.len()
    }

    pub fn classifier(&self) -> &MessageClassifier {
        &self.classifier
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    pub fn states(&self) -> &NodeStates {
        &self.states
    }

    pub fn stats(&self) -> EngineStatsSnapshot {
        self.stats.snapshot()
    }

    /// 守卫检查；通过时认领节点并返回 `(原文, 目标语言, 认领凭据)`
    fn claim(&self, node: &Handle) -> TranslationResult<Result<(String, String, ClaimToken), SkipReason>> {
        let preferences = self.preferences.get();
        if !preferences.enabled {
            return Ok(Err(SkipReason::Disabled));
        }

        if self.states.state(node) != ProcessingState::Untouched || self.states.is_claimed_nearby(node) {
            return Ok(Err(SkipReason::AlreadyClaimed));
        }

        if self.classifier.classify(node) != Classification::Message {
            return Ok(Err(SkipReason::NotAMessage));
        }

        let text = self
            .extractor
            .extract(node)
            .ok_or_else(|| TranslationError::ExtractionFailed("消息节点中没有可用文本".to_string()))?;

        if self.filter.is_command(&text) {
            return Ok(Err(SkipReason::Command));
        }

        if !self.filter.is_within_bounds(&text) {
            return Ok(Err(SkipReason::OutOfBounds));
        }

        let Some(token) = self.states.mark_in_flight(node) else {
            return Ok(Err(SkipReason::AlreadyClaimed));
        };

        Ok(Ok((text, preferences.target_language, token)))
    }

    fn finish(&self, node: &Handle, token: ClaimToken, original: &str, translated: &str) -> TranslationResult<()> {
        match self.applier.apply(node, original, translated) {
            Ok(_) => {
                self.states.mark_done(node, token, original);
                EngineStats::bump(&self.stats.translated);
                Ok(())
            }
            Err(e) => {
                self.states.release(node, token);
                EngineStats::bump(&self.stats.apply_failures);
                Err(e)
            }
        }
    }
}
