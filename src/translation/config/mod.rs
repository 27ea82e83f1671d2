//! 翻译配置管理模块
//!
//! 提供配置管理（环境变量、配置文件和默认值）以及聊天页面的结构签名。

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, TranslatorConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 默认API设置
    pub const DEFAULT_API_URL: &str = "http://localhost:1188/translate";
    pub const DEFAULT_SOURCE_LANG: &str = "auto";
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    // 偏好设置默认值
    pub const DEFAULT_TARGET_LANGUAGE: &str = "en";
    pub const MAX_LANGUAGE_CODE_LENGTH: usize = 16;
    pub const DEFAULT_PREFERENCES_PATH: &str = "~/.config/chat-translator/preferences.toml";

    // 调度时间
    pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_millis(1000);
    pub const DEFAULT_INITIAL_SCAN_DELAYS_MS: [u64; 3] = [1000, 3000, 5000];
    pub const DEFAULT_CONTAINER_RETRY: Duration = Duration::from_millis(2000);
    pub const DEFAULT_RESCAN_DELAY: Duration = Duration::from_millis(500);
    pub const DEFAULT_PERIODIC_SCAN: Duration = Duration::from_millis(10000);

    // 文本过滤相关
    pub const MIN_TEXT_LENGTH: usize = 2;
    pub const MAX_TEXT_LENGTH: usize = 500;
    pub const CONTAINER_MIN_TEXT_LENGTH: usize = 100;
    pub const CONTAINER_MIN_MESSAGE_ROWS: usize = 2;
    pub const COMMAND_PREFIXES: &[char] = &['!', '/'];

    // 译文标记
    pub const INDICATOR_CLASS: &str = "translation-indicator";
    pub const INDICATOR_GLYPH: &str = " 🌐";
    pub const INDICATOR_STYLE: &str =
        "opacity: 0.6; font-size: 0.9em; cursor: help; margin-left: 2px; display: inline-block;";
    pub const INDICATOR_TITLE_PREFIX: &str = "Translated from: ";
    pub const PROVENANCE_ATTR: &str = "data-original-text";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "chat-translator.toml",
        ".chat-translator.toml",
        "~/.config/chat-translator/config.toml",
        "/etc/chat-translator/config.toml",
    ];
}

/// 聊天页面结构签名
///
/// 所有列表都是有序的：越靠前越具体，命中即停止。
pub mod signatures {
    /// 聊天滚动容器（属性签名在前，类名签名在后）
    pub const CONTAINER: &[&str] = &[
        r#"[data-a-target="chat-scrollable-area"]"#,
        r#"[data-a-target="chat-messages"]"#,
        ".chat-scrollable-area__message-container",
        r#"[data-test-selector="chat-scrollable-area"]"#,
        ".chat-list",
        r#"[aria-label*="Chat"]"#,
        r#"[aria-label*="chat"]"#,
        r#"section[data-a-target="chat-container"]"#,
        r#"div[data-a-target="chat-container"]"#,
        r#"[class*="chat-list"]"#,
        r#"[class*="chat-messages"]"#,
        r#"[class*="chatContainer"]"#,
    ];

    /// 内容密度策略中可作为容器的元素
    pub const DENSITY: &[&str] = &[
        r#"[data-a-target*="chat"]"#,
        r#"[class*="chat"]"#,
        r#"[id*="chat"]"#,
    ];

    /// 消息候选节点
    pub const CANDIDATE: &[&str] = &[
        r#"[data-a-target="chat-line-message"]"#,
        r#"[data-a-target="chat-message"]"#,
        r#"[data-a-target="chat-line-message-body"]"#,
        ".chat-line__message",
        ".chat-line",
        r#"[data-test-selector="chat-line-message"]"#,
        r#"[class*="chat-line"]"#,
        r#"[class*="chatLine"]"#,
        r#"[class*="message"]"#,
    ];

    /// 消息行（用于区分容器与单条消息）
    pub const MESSAGE_ROW: &[&str] = &[
        r#"[data-a-target="chat-line-message"]"#,
        r#"[data-a-target="chat-message"]"#,
        r#"[data-test-selector="chat-line-message"]"#,
        ".chat-line__message",
        ".chat-line",
    ];

    /// 节点自身的消息特征
    pub const OWN_MARKER: &[&str] = &[
        r#"[data-a-target*="message"]"#,
        r#"[data-a-target*="chat"]"#,
        r#"[class*="chat-line"]"#,
        r#"[class*="message"]"#,
    ];

    /// 后代中的消息特征
    pub const DESCENDANT_MARKER: &[&str] = &[
        r#"[data-a-target*="message"]"#,
        r#"[data-a-target*="chat"]"#,
        ".chat-line",
    ];

    /// 聊天相关祖先
    pub const CHAT_ANCESTOR: &[&str] = &[r#"[data-a-target*="chat"]"#];

    /// 消息正文
    pub const MESSAGE_TEXT: &[&str] = &[
        ".text-fragment",
        r#"[data-a-target="chat-message-text"]"#,
        r#"[data-a-target="chat-line-message-body"]"#,
        ".chat-line__message-text",
        r#"span[data-a-target="chat-message-text"]"#,
        r#"[class*="message-text"]"#,
        r#"[class*="text-fragment"]"#,
    ];

    /// 用户名
    pub const USERNAME: &[&str] = &[
        r#"[data-a-target="chat-message-username"]"#,
        r#"[data-a-target="chat-author"]"#,
        ".chat-author__display-name",
        r#"[class*="username"]"#,
        r#"[class*="author"]"#,
    ];

    /// 时间戳
    pub const TIMESTAMP: &[&str] = &[
        r#"[data-a-target="chat-message-timestamp"]"#,
        ".chat-line__timestamp",
        r#"[class*="timestamp"]"#,
        r#"[class*="time"]"#,
    ];

    /// 徽章、表情、图片和译文标记
    pub const DECORATION: &[&str] = &[
        r#"[class*="badge"]"#,
        r#"[class*="emote"]"#,
        "img",
        "svg",
        ".translation-indicator",
    ];

    /// 节点本身就是装饰物（不会被当作消息）
    pub const DECORATION_NODE: &[&str] = &[
        r#"[data-a-target="chat-message-username"]"#,
        r#"[data-a-target="chat-author"]"#,
        ".chat-author__display-name",
        r#"[data-a-target="chat-message-timestamp"]"#,
        ".chat-line__timestamp",
        r#"[class*="badge"]"#,
    ];
}

/// 加载配置，失败时退回默认值
pub fn load_translator_config() -> TranslatorConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.into_config(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            TranslatorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::selector::SelectorChain;

    #[test]
    fn test_all_signatures_parse() {
        for list in [
            signatures::CONTAINER,
            signatures::DENSITY,
            signatures::CANDIDATE,
            signatures::MESSAGE_ROW,
            signatures::OWN_MARKER,
            signatures::DESCENDANT_MARKER,
            signatures::CHAT_ANCESTOR,
            signatures::MESSAGE_TEXT,
            signatures::USERNAME,
            signatures::TIMESTAMP,
            signatures::DECORATION,
            signatures::DECORATION_NODE,
        ] {
            let chain = SelectorChain::parse(list).unwrap();
            assert_eq!(chain.selectors().len(), list.len());
        }
    }

    #[test]
    fn test_container_signature_count() {
        assert_eq!(signatures::CONTAINER.len(), 12);
        assert_eq!(signatures::MESSAGE_TEXT.len(), 7);
    }
}
