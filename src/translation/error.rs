//! 翻译模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。所有错误都不会中断翻译循环，
//! 只通过日志暴露；翻译器退化为“部分消息未翻译”。

use std::fmt;

use thiserror::Error;

/// 翻译错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TranslationError {
    /// 未找到聊天容器（按固定间隔重试）
    #[error("未找到聊天容器: {0}")]
    ContainerNotFound(String),

    /// 无法从消息节点提取文本
    #[error("文本提取失败: {0}")]
    ExtractionFailed(String),

    /// 翻译服务错误（网络失败、非2xx状态或响应结构错误）
    #[error("翻译服务错误: {0}")]
    ProviderError(String),

    /// 找不到可写入译文的文本节点
    #[error("应用译文失败: {0}")]
    ApplyFailed(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 选择器签名无效
    #[error("无效的选择器: {0}")]
    InvalidSelector(String),

    /// 偏好设置读写错误
    #[error("偏好设置错误: {0}")]
    PreferenceError(String),

    /// 控制通道已关闭
    #[error("控制通道已关闭")]
    ControlChannelClosed,

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl TranslationError {
    /// 检查错误是否可重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TranslationError::ContainerNotFound(_) => true,
            TranslationError::ExtractionFailed(_) => true,
            TranslationError::ProviderError(_) => true,
            TranslationError::ApplyFailed(_) => true,
            TranslationError::ConfigError(_) => false,
            TranslationError::InvalidSelector(_) => false,
            TranslationError::PreferenceError(_) => false,
            TranslationError::ControlChannelClosed => false,
            TranslationError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TranslationError::ContainerNotFound(_) => ErrorSeverity::Warning,
            TranslationError::ExtractionFailed(_) => ErrorSeverity::Info,
            TranslationError::ProviderError(_) => ErrorSeverity::Error,
            TranslationError::ApplyFailed(_) => ErrorSeverity::Warning,
            TranslationError::ConfigError(_) => ErrorSeverity::Critical,
            TranslationError::InvalidSelector(_) => ErrorSeverity::Critical,
            TranslationError::PreferenceError(_) => ErrorSeverity::Error,
            TranslationError::ControlChannelClosed => ErrorSeverity::Warning,
            TranslationError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            TranslationError::ContainerNotFound(_) => ErrorCategory::Detection,
            TranslationError::ExtractionFailed(_) => ErrorCategory::Extraction,
            TranslationError::ProviderError(_) => ErrorCategory::Provider,
            TranslationError::ApplyFailed(_) => ErrorCategory::Apply,
            TranslationError::ConfigError(_) => ErrorCategory::Configuration,
            TranslationError::InvalidSelector(_) => ErrorCategory::Configuration,
            TranslationError::PreferenceError(_) => ErrorCategory::Preferences,
            TranslationError::ControlChannelClosed => ErrorCategory::Control,
            TranslationError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let current_msg = self.to_string();
        let new_msg = format!("{} (上下文: {})", current_msg, context);

        match &mut self {
            TranslationError::ContainerNotFound(ref mut msg) => *msg = new_msg,
            TranslationError::ExtractionFailed(ref mut msg) => *msg = new_msg,
            TranslationError::ProviderError(ref mut msg) => *msg = new_msg,
            TranslationError::ApplyFailed(ref mut msg) => *msg = new_msg,
            TranslationError::ConfigError(ref mut msg) => *msg = new_msg,
            TranslationError::InvalidSelector(ref mut msg) => *msg = new_msg,
            TranslationError::PreferenceError(ref mut msg) => *msg = new_msg,
            TranslationError::InternalError(ref mut msg) => *msg = new_msg,
            TranslationError::ControlChannelClosed => {
                return TranslationError::ControlChannelClosed;
            }
        }

        self
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Detection,
    Extraction,
    Provider,
    Apply,
    Configuration,
    Preferences,
    Control,
    Internal,
}

impl From<reqwest::Error> for TranslationError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TranslationError::ProviderError(format!("请求超时: {}", error))
        } else {
            TranslationError::ProviderError(format!("网络错误: {}", error))
        }
    }
}

impl From<serde_json::Error> for TranslationError {
    fn from(error: serde_json::Error) -> Self {
        TranslationError::ProviderError(format!("JSON解析错误: {}", error))
    }
}

impl From<toml::de::Error> for TranslationError {
    fn from(error: toml::de::Error) -> Self {
        TranslationError::ConfigError(format!("TOML解析错误: {}", error))
    }
}

impl From<url::ParseError> for TranslationError {
    fn from(error: url::ParseError) -> Self {
        TranslationError::ConfigError(format!("URL解析错误: {}", error))
    }
}

/// 错误结果类型别名
pub type TranslationResult<T> = Result<T, TranslationError>;

/// 错误统计信息
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: std::collections::HashMap<ErrorCategory, usize>,
    pub retryable_errors: usize,
}

impl ErrorStats {
    /// 记录错误
    pub fn record_error(&mut self, error: &TranslationError) {
        self.total_errors += 1;
        *self.by_category.entry(error.category()).or_insert(0) += 1;

        if error.is_retryable() {
            self.retryable_errors += 1;
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Default::default();
    }
}

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误
    pub fn log_error(error: &TranslationError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::debug!("翻译信息: {}", error),
            ErrorSeverity::Warning => tracing::warn!("翻译警告: {}", error),
            ErrorSeverity::Error => tracing::error!("翻译错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("翻译严重错误: {}", error),
        }
    }
}
