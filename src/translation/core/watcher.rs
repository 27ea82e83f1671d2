//! 变更监视器
//!
//! 负责找到聊天容器、订阅容器内的结构性变更，并安排全量扫描：
//!
//! - 启动后按固定延迟做几次分阶段扫描（聊天内容是动态加载的）
//! - 找不到容器时按固定间隔重试，不会产生重复订阅
//! - 容器被移出文档（单页应用导航）时放弃旧订阅并重新查找
//! - 周期性兜底扫描，补上翻译失败后被释放的节点
//!
//! 所有任务都通过 `spawn_local` 运行，必须在 `LocalSet` 中启动。

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use futures::future::join_all;
use markup5ever_rcdom::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::host::document::{LiveDocument, MutationRecord};
use crate::translation::config::TranslatorConfig;
use crate::translation::core::engine::{ProcessOutcome, TranslationEngine};
use crate::parsers::html::dom::is_element;
use crate::parsers::html::serializer::serialize_node;
use crate::translation::error::{helpers::log_error, ErrorStats, TranslationError};

/// 监视器调度参数
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherConfig {
    pub initial_scan_delays: Vec<Duration>,
    pub container_retry: Duration,
    pub rescan_delay: Duration,
    pub periodic_scan: Option<Duration>,
}

impl From<&TranslatorConfig> for WatcherConfig {
    fn from(config: &TranslatorConfig) -> Self {
        Self {
            initial_scan_delays: config.initial_scan_delays(),
            container_retry: config.container_retry(),
            rescan_delay: config.rescan_delay(),
            periodic_scan: config.periodic_scan(),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self::from(&TranslatorConfig::default())
    }
}

/// 一次全量扫描的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub candidates: usize,
    pub translated: usize,
    pub from_cache: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ScanReport {
    fn record(&mut self, outcome: &Result<ProcessOutcome, TranslationError>) {
        match outcome {
            Ok(ProcessOutcome::Translated { from_cache }) => {
                self.translated += 1;
                if *from_cache {
                    self.from_cache += 1;
                }
            }
            Ok(_) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// 运行中的任务，丢弃时全部中止
struct ActiveWatch {
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for ActiveWatch {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// 变更监视器
pub struct MutationWatcher {
    document: Rc<LiveDocument>,
    engine: Rc<TranslationEngine>,
    config: WatcherConfig,
    active: RefCell<Option<ActiveWatch>>,
    container: RefCell<Option<Handle>>,
    errors: RefCell<ErrorStats>,
}

impl MutationWatcher {
    pub fn new(document: Rc<LiveDocument>, engine: Rc<TranslationEngine>, config: WatcherConfig) -> Rc<Self> {
        Rc::new(Self {
            document,
            engine,
            config,
            active: RefCell::new(None),
            container: RefCell::new(None),
            errors: RefCell::new(ErrorStats::default()),
        })
    }

    /// 启动监视；已在运行时什么也不做
    pub fn start(self: &Rc<Self>) {
        if self.active.borrow().is_some() {
            tracing::debug!("监视器已在运行");
            return;
        }

        tracing::info!("启动聊天监视器");
        let started = Instant::now();
        let mut tasks = Vec::new();

        for delay in &self.config.initial_scan_delays {
            let weak = Rc::downgrade(self);
            let deadline = started + *delay;
            tasks.push(tokio::task::spawn_local(async move {
                time::sleep_until(deadline).await;
                if let Some(watcher) = weak.upgrade() {
                    let report = watcher.scan_all().await;
                    tracing::debug!("分阶段扫描完成: {:?}", report);
                }
            }));
        }

        tasks.push(tokio::task::spawn_local(Self::watch_loop(Rc::downgrade(self))));

        if let Some(period) = self.config.periodic_scan {
            let weak = Rc::downgrade(self);
            tasks.push(tokio::task::spawn_local(async move {
                let mut ticker = time::interval_at(started + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let Some(watcher) = weak.upgrade() else {
                        return;
                    };
                    let report = watcher.scan_all().await;
                    tracing::trace!("周期扫描完成: {:?}", report);
                }
            }));
        }

        *self.active.borrow_mut() = Some(ActiveWatch { tasks });
    }

    /// 停止监视并释放订阅；未运行时什么也不做
    pub fn stop(&self) {
        // 先取出再丢弃，中止任务时会连带丢弃订阅
        let active = self.active.borrow_mut().take();
        if active.is_some() {
            tracing::info!("停止聊天监视器");
        }
        drop(active);
        *self.container.borrow_mut() = None;
    }

    pub fn is_running(&self) -> bool {
        self.active.borrow().is_some()
    }

    /// 当前订阅的容器
    pub fn container(&self) -> Option<Handle> {
        self.container.borrow().clone()
    }

    /// 累计的错误统计
    pub fn error_stats(&self) -> ErrorStats {
        self.errors.borrow().clone()
    }

    /// 从容器重新收集候选节点并逐个处理
    pub async fn scan_all(&self) -> ScanReport {
        let Some(container) = self.current_or_locate() else {
            self.note_error(&TranslationError::ContainerNotFound("全量扫描时未找到聊天容器".to_string()));
            return ScanReport::default();
        };

        self.engine.states().prune();
        let candidates = self.engine.classifier().find_candidates(&container);
        let mut report = ScanReport {
            candidates: candidates.len(),
            ..ScanReport::default()
        };

        let engine = &self.engine;
        let outcomes = join_all(candidates.iter().map(|node| engine.process(node))).await;
        for outcome in &outcomes {
            report.record(outcome);
            if let Err(e) = outcome {
                self.note_error(e);
            }
        }

        if report.translated > 0 || report.failed > 0 {
            tracing::info!(
                "扫描 {} 个候选: 翻译 {} (缓存 {}), 失败 {}",
                report.candidates,
                report.translated,
                report.from_cache,
                report.failed
            );
        }
        report
    }

    /// 清空缓存并恢复所有已翻译节点
    pub fn reset(&self) -> usize {
        self.engine.reset()
    }

    /// 重置后稍等片刻再全量扫描
    pub async fn reset_and_rescan(&self) -> ScanReport {
        self.reset();
        time::sleep(self.config.rescan_delay).await;
        self.scan_all().await
    }

    /// 在 `rescan_delay` 之后于后台全量扫描
    pub fn schedule_rescan(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let delay = self.config.rescan_delay;
        tokio::task::spawn_local(async move {
            time::sleep(delay).await;
            if let Some(watcher) = weak.upgrade() {
                let report = watcher.scan_all().await;
                tracing::debug!("重置后重扫完成: {:?}", report);
            }
        });
    }

    fn current_or_locate(&self) -> Option<Handle> {
        if let Some(container) = self.container() {
            if self.document.is_attached(&container) {
                return Some(container);
            }
        }
        self.engine.classifier().locate_container(self.document.document())
    }

    fn note_error(&self, error: &TranslationError) {
        log_error(error);
        self.errors.borrow_mut().record_error(error);
    }

    /// 把一条变更中新增的元素及其候选后代逐个提交
    fn handle_mutation(self: &Rc<Self>, record: MutationRecord) {
        for node in record.added_nodes.into_iter().filter(is_element) {
            tracing::trace!("新增节点: {}", serialize_node(&node));
            let mut submissions = vec![node.clone()];
            submissions.extend(self.engine.classifier().find_candidates(&node));

            for candidate in submissions {
                let engine = self.engine.clone();
                let weak = Rc::downgrade(self);
                tokio::task::spawn_local(async move {
                    if let Err(e) = engine.process(&candidate).await {
                        match weak.upgrade() {
                            Some(watcher) => watcher.note_error(&e),
                            None => log_error(&e),
                        }
                    }
                });
            }
        }
    }

    async fn watch_loop(weak: Weak<Self>) {
        let mut acquired_before = false;

        loop {
            let Some(watcher) = weak.upgrade() else {
                return;
            };
            let retry = watcher.config.container_retry;

            let Some(container) = watcher
                .engine
                .classifier()
                .locate_container(watcher.document.document())
            else {
                watcher.note_error(&TranslationError::ContainerNotFound(format!(
                    "{} 毫秒后重试",
                    retry.as_millis()
                )));
                drop(watcher);
                time::sleep(retry).await;
                continue;
            };

            let mut subscription = watcher.document.observe(&container);
            *watcher.container.borrow_mut() = Some(container.clone());
            tracing::info!("开始观察聊天容器 (订阅 #{})", subscription.id());

            if acquired_before {
                // 容器换过，新容器里的已有消息需要补扫
                let weak_rescan = weak.clone();
                tokio::task::spawn_local(async move {
                    if let Some(watcher) = weak_rescan.upgrade() {
                        watcher.scan_all().await;
                    }
                });
            }
            acquired_before = true;
            drop(watcher);

            let mut health = time::interval_at(Instant::now() + retry, retry);
            health.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    record = subscription.next() => {
                        let Some(record) = record else {
                            tracing::warn!("变更订阅已关闭");
                            break;
                        };
                        let Some(watcher) = weak.upgrade() else {
                            return;
                        };
                        watcher.handle_mutation(record);
                    }
                    _ = health.tick() => {
                        let Some(watcher) = weak.upgrade() else {
                            return;
                        };
                        if !watcher.document.is_attached(&container) {
                            tracing::info!("聊天容器已离开文档，重新查找");
                            break;
                        }
                    }
                }
            }

            drop(subscription);
            if let Some(watcher) = weak.upgrade() {
                *watcher.container.borrow_mut() = None;
            }
        }
    }
}

impl Drop for MutationWatcher {
    fn drop(&mut self) {
        self.active.get_mut().take();
    }
}
