//! 消息文本提取器
//!
//! 先按消息正文签名查找；找不到时克隆节点，去掉用户名、时间戳、
//! 徽章、表情和图片后取剩余文本。

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::{deep_clone, detach, text_content};
use crate::parsers::html::selector::SelectorChain;
use crate::translation::config::{constants, signatures};
use crate::translation::error::TranslationResult;

/// 文本提取器
#[derive(Debug, Clone)]
pub struct TextExtractor {
    message_text: SelectorChain,
    noise: SelectorChain,
    min_length: usize,
}

impl TextExtractor {
    pub fn new() -> TranslationResult<Self> {
        Self::with_min_length(constants::MIN_TEXT_LENGTH)
    }

    pub fn with_min_length(min_length: usize) -> TranslationResult<Self> {
        let noise = SelectorChain::parse(signatures::USERNAME)?
            .concat(&SelectorChain::parse(signatures::TIMESTAMP)?)
            .concat(&SelectorChain::parse(signatures::DECORATION)?);

        Ok(Self {
            message_text: SelectorChain::parse(signatures::MESSAGE_TEXT)?,
            noise,
            min_length,
        })
    }

    /// 提取消息文本，返回去除首尾空白后的结果
    pub fn extract(&self, node: &Handle) -> Option<String> {
        if let Some(text) = self.extract_primary(node) {
            return Some(text);
        }
        self.extract_fallback(node)
    }

    fn extract_primary(&self, node: &Handle) -> Option<String> {
        let mut found = None;
        self.message_text.first_match(node, |candidate| {
            let text = text_content(candidate).trim().to_string();
            if text.chars().count() >= self.min_length {
                found = Some(text);
                true
            } else {
                false
            }
        });
        found
    }

    fn extract_fallback(&self, node: &Handle) -> Option<String> {
        let copy = deep_clone(node);
        for noise in self.noise.query_all(&copy) {
            detach(&noise);
        }

        let text = text_content(&copy).trim().to_string();
        if text.chars().count() >= self.min_length {
            tracing::trace!("使用后备提取: {}", text);
            Some(text)
        } else {
            None
        }
    }
}
