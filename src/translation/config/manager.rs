//! 配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::translation::error::{TranslationError, TranslationResult};

/// 翻译器配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslatorConfig {
    // 翻译服务
    pub api_url: String,
    pub source_lang: String,
    pub request_timeout_secs: u64,

    // 调度
    pub startup_delay_ms: u64,
    pub initial_scan_delays_ms: Vec<u64>,
    pub container_retry_ms: u64,
    pub rescan_delay_ms: u64,
    pub periodic_scan_ms: u64,

    // 文本过滤
    pub min_text_length: usize,
    pub max_text_length: usize,
    pub container_min_text_length: usize,

    // 偏好设置
    pub preferences_path: String,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            api_url: constants::DEFAULT_API_URL.to_string(),
            source_lang: constants::DEFAULT_SOURCE_LANG.to_string(),
            request_timeout_secs: constants::DEFAULT_REQUEST_TIMEOUT.as_secs(),

            startup_delay_ms: constants::DEFAULT_STARTUP_DELAY.as_millis() as u64,
            initial_scan_delays_ms: constants::DEFAULT_INITIAL_SCAN_DELAYS_MS.to_vec(),
            container_retry_ms: constants::DEFAULT_CONTAINER_RETRY.as_millis() as u64,
            rescan_delay_ms: constants::DEFAULT_RESCAN_DELAY.as_millis() as u64,
            periodic_scan_ms: constants::DEFAULT_PERIODIC_SCAN.as_millis() as u64,

            min_text_length: constants::MIN_TEXT_LENGTH,
            max_text_length: constants::MAX_TEXT_LENGTH,
            container_min_text_length: constants::CONTAINER_MIN_TEXT_LENGTH,

            preferences_path: constants::DEFAULT_PREFERENCES_PATH.to_string(),
        }
    }
}

impl TranslatorConfig {
    /// 创建带指定服务地址的默认配置
    pub fn with_api_url(api_url: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            ..Self::default()
        }
    }

    /// 验证配置
    pub fn validate(&self) -> TranslationResult<()> {
        url::Url::parse(&self.api_url)
            .map_err(|e| TranslationError::ConfigError(format!("无效的API地址 {}: {}", self.api_url, e)))?;

        if self.source_lang.trim().is_empty() {
            return Err(TranslationError::ConfigError("源语言不能为空".to_string()));
        }

        if self.request_timeout_secs == 0 {
            return Err(TranslationError::ConfigError("请求超时不能为0".to_string()));
        }

        if self.container_retry_ms == 0 {
            return Err(TranslationError::ConfigError("容器重试间隔不能为0".to_string()));
        }

        if self.min_text_length == 0 || self.min_text_length > self.max_text_length {
            return Err(TranslationError::ConfigError(format!(
                "文本长度范围无效: [{}, {}]",
                self.min_text_length, self.max_text_length
            )));
        }

        Ok(())
    }

    /// 应用环境变量覆盖（只覆盖环境中出现的变量）
    pub fn apply_env_overrides(&mut self) {
        use crate::env::{preferences, translation, watcher, EnvVar};

        fn report<T>(name: &str, result: crate::env::EnvResult<T>, set: bool) -> Option<T> {
            match result {
                Ok(value) => Some(value),
                Err(e) if set => {
                    tracing::warn!("忽略无效的环境变量 {}: {}", name, e);
                    None
                }
                Err(_) => None,
            }
        }

        if let Some(api_url) = report(
            translation::ApiUrl::NAME,
            translation::ApiUrl::get(),
            translation::ApiUrl::is_set(),
        ) {
            self.api_url = api_url;
            tracing::info!("环境变量覆盖 API URL: {}", self.api_url);
        }

        if let Some(source_lang) = report(
            translation::SourceLang::NAME,
            translation::SourceLang::get(),
            translation::SourceLang::is_set(),
        ) {
            self.source_lang = source_lang;
        }

        if let Some(timeout) = report(
            translation::RequestTimeout::NAME,
            translation::RequestTimeout::get(),
            translation::RequestTimeout::is_set(),
        ) {
            self.request_timeout_secs = timeout.as_secs();
        }

        if let Some(max_len) = report(
            translation::MaxTextLength::NAME,
            translation::MaxTextLength::get(),
            translation::MaxTextLength::is_set(),
        ) {
            self.max_text_length = max_len;
        }

        if let Some(retry) = report(
            watcher::ContainerRetry::NAME,
            watcher::ContainerRetry::get(),
            watcher::ContainerRetry::is_set(),
        ) {
            self.container_retry_ms = retry.as_millis() as u64;
        }

        if let Some(delay) = report(
            watcher::RescanDelay::NAME,
            watcher::RescanDelay::get(),
            watcher::RescanDelay::is_set(),
        ) {
            self.rescan_delay_ms = delay.as_millis() as u64;
        }

        if let Some(interval) = report(
            watcher::PeriodicScan::NAME,
            watcher::PeriodicScan::get(),
            watcher::PeriodicScan::is_set(),
        ) {
            self.periodic_scan_ms = interval.as_millis() as u64;
        }

        if let Some(path) = report(
            preferences::Path::NAME,
            preferences::Path::get(),
            preferences::Path::is_set(),
        ) {
            self.preferences_path = path;
        }
    }

    /// 转换为Duration类型
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn initial_scan_delays(&self) -> Vec<Duration> {
        self.initial_scan_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    pub fn container_retry(&self) -> Duration {
        Duration::from_millis(self.container_retry_ms)
    }

    pub fn rescan_delay(&self) -> Duration {
        Duration::from_millis(self.rescan_delay_ms)
    }

    /// 周期扫描间隔，0 表示关闭
    pub fn periodic_scan(&self) -> Option<Duration> {
        (self.periodic_scan_ms > 0).then(|| Duration::from_millis(self.periodic_scan_ms))
    }

    /// 展开 `~` 后的偏好设置路径
    pub fn preferences_path(&self) -> String {
        shellexpand::tilde(&self.preferences_path).into_owned()
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: TranslatorConfig,
}

impl ConfigManager {
    /// 创建新的配置管理器（搜索默认路径）
    pub fn new() -> TranslationResult<Self> {
        let mut config = Self::load_config()?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 从指定文件创建配置管理器
    pub fn from_file(path: &str) -> TranslationResult<Self> {
        Self::load_dotenv();

        let expanded_path = shellexpand::tilde(path);
        let mut config = Self::load_from_file(&expanded_path)?;
        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &TranslatorConfig {
        &self.config
    }

    pub fn into_config(self) -> TranslatorConfig {
        self.config
    }

    /// 从文件加载配置
    fn load_config() -> TranslationResult<TranslatorConfig> {
        // 首先尝试加载 .env 文件
        Self::load_dotenv();

        // 查找配置文件
        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(&expanded_path);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(TranslatorConfig::default())
    }

    /// 从指定文件加载配置
    fn load_from_file(path: &str) -> TranslationResult<TranslatorConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TranslationError::ConfigError(format!("读取配置文件失败: {}", e)))?;

        // 尝试TOML格式
        if path.ends_with(".toml") {
            toml::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析TOML配置失败: {}", e)))
        } else {
            // 尝试JSON格式
            serde_json::from_str(&content)
                .map_err(|e| TranslationError::ConfigError(format!("解析JSON配置失败: {}", e)))
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: &str) -> TranslationResult<()> {
        let config = TranslatorConfig::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| TranslationError::ConfigError(format!("序列化配置失败: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| TranslationError::ConfigError(format!("写入配置文件失败: {}", e)))?;

        Ok(())
    }
}
