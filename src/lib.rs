//! # Chat Translator Library
//!
//! 在持续变化的聊天页面中实时翻译消息：找到聊天容器，识别新出现的消息，
//! 提取正文交给翻译服务，再把译文写回原处并附上来源标记。
//!
//! ## 模块组织
//!
//! - `env` - 环境变量定义与解析
//! - `host` - 宿主环境：可观察文档、偏好设置、控制通道
//! - `parsers` - HTML 解析、DOM 操作、选择器签名与序列化
//! - `translation` - 消息识别、翻译、缓存、写回与监视

pub mod env;
pub mod host;
pub mod parsers;
pub mod translation;

// Re-export commonly used items for convenience
pub use host::{control_channel, ControlHandle, LiveDocument, PreferenceStore, Preferences};
pub use translation::{
    ChatTranslator, ConfigManager, HttpTranslationProvider, TranslationError, TranslationProvider,
    TranslationResult, TranslatorConfig,
};
