//! 文本过滤器模块
//!
//! 判断提取出的消息文本是否需要翻译：聊天命令不翻译，长度越界的不翻译。

use crate::translation::config::{constants, TranslatorConfig};

/// 文本过滤器
#[derive(Debug, Clone)]
pub struct TextFilter {
    min_length: usize,
    max_length: usize,
}

impl Default for TextFilter {
    fn default() -> Self {
        Self::new(constants::MIN_TEXT_LENGTH, constants::MAX_TEXT_LENGTH)
    }
}

impl TextFilter {
    /// 创建新的文本过滤器，长度以字符计
    pub fn new(min_length: usize, max_length: usize) -> Self {
        Self {
            min_length,
            max_length,
        }
    }

    pub fn from_config(config: &TranslatorConfig) -> Self {
        Self::new(config.min_text_length, config.max_text_length)
    }

    /// 是否为聊天命令（以 `!` 或 `/` 开头）
    pub fn is_command(&self, text: &str) -> bool {
        text.trim_start()
            .starts_with(constants::COMMAND_PREFIXES)
    }

    /// 去除首尾空白后的字符数是否落在 `[min, max]` 内
    pub fn is_within_bounds(&self, text: &str) -> bool {
        let length = text.trim().chars().count();
        length >= self.min_length && length <= self.max_length
    }

    /// 判断文本是否需要翻译
    pub fn should_translate(&self, text: &str) -> bool {
        self.is_within_bounds(text) && !self.is_command(text)
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}
