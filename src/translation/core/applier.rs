//! 译文应用器
//!
//! 找到消息节点中真正渲染正文的子元素，写入译文，记录原文出处，
//! 并追加一个带原文提示的译文标记。

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::{
    append_child, child_elements, create_element, create_text, descendant_text_nodes, detach,
    get_node_attr, get_parent_node, set_node_attr, set_text_content, text_content,
};
use crate::parsers::html::selector::SelectorChain;
use crate::translation::config::{constants, signatures};
use crate::translation::error::{TranslationError, TranslationResult};

/// 译文应用器
#[derive(Debug, Clone)]
pub struct TextApplier {
    message_text: SelectorChain,
    indicator: SelectorChain,
    provenance: SelectorChain,
}

impl TextApplier {
    pub fn new() -> TranslationResult<Self> {
        Ok(Self {
            message_text: SelectorChain::parse(signatures::MESSAGE_TEXT)?,
            indicator: SelectorChain::parse(&[&format!(".{}", constants::INDICATOR_CLASS)])?,
            provenance: SelectorChain::parse(&[&format!("[{}]", constants::PROVENANCE_ATTR)])?,
        })
    }

    /// 应用译文，返回被改写的正文元素
    pub fn apply(&self, node: &Handle, original: &str, translated: &str) -> TranslationResult<Handle> {
        let target = self.locate_text_element(node, original).ok_or_else(|| {
            TranslationError::ApplyFailed(format!("找不到包含原文的文本节点: {}", preview(original)))
        })?;

        if get_node_attr(&target, constants::PROVENANCE_ATTR).is_none() {
            set_node_attr(&target, constants::PROVENANCE_ATTR, Some(original.to_string()));
        }

        // 旧标记会被文本覆盖吞掉，先摘除
        for existing in self.indicator.query_all(&target) {
            detach(&existing);
        }

        let current = text_content(&target);
        if current.contains(original) {
            set_text_content(&target, &current.replacen(original, translated, 1));
        } else {
            // 无法精确定位原文时整体覆盖，可能丢失正文中的其他内容
            tracing::debug!("原文未精确匹配，整体覆盖文本");
            set_text_content(&target, translated);
        }

        if !self.has_indicator(&target) && !self.has_indicator(node) {
            append_child(&target, self.create_indicator(original));
        }

        tracing::debug!("已翻译: {} -> {}", preview(original), preview(translated));
        Ok(target)
    }

    /// 恢复原文并移除译文标记（出处属性保留）
    pub fn revert(&self, node: &Handle) {
        for indicator in self.indicator.self_and_descendants(node) {
            detach(&indicator);
        }

        for element in self.provenance.self_and_descendants(node) {
            if let Some(original) = get_node_attr(&element, constants::PROVENANCE_ATTR) {
                set_text_content(&element, &original);
            }
        }
    }

    /// 节点自身或后代中是否已有译文标记
    pub fn has_indicator(&self, node: &Handle) -> bool {
        self.indicator.matches(node) || self.indicator.has_descendant(node)
    }

    fn locate_text_element(&self, node: &Handle, original: &str) -> Option<Handle> {
        // 1. 正文签名
        if let Some((found, _)) = self
            .message_text
            .first_match(node, |candidate| text_content(candidate).trim().chars().count() >= 2)
        {
            return Some(found);
        }

        // 2. 文本叶子：完全相等，或包含原文且长度不到原文两倍
        let original_len = original.chars().count();
        for leaf in descendant_text_nodes(node) {
            let leaf_text = text_content(&leaf);
            let leaf_text = leaf_text.trim();
            if leaf_text == original
                || (leaf_text.contains(original) && leaf_text.chars().count() < original_len * 2)
            {
                if let Some(parent) = get_parent_node(&leaf) {
                    return Some(parent);
                }
            }
        }

        // 3. 包含原文的第一个子元素，否则节点本身
        if text_content(node).contains(original) {
            let child = child_elements(node)
                .into_iter()
                .find(|child| text_content(child).contains(original));
            return Some(child.unwrap_or_else(|| node.clone()));
        }

        None
    }

    fn create_indicator(&self, original: &str) -> Handle {
        let title = format!("{}{}", constants::INDICATOR_TITLE_PREFIX, original);
        let indicator = create_element(
            "span",
            &[
                ("class", constants::INDICATOR_CLASS),
                ("title", title.as_str()),
                ("style", constants::INDICATOR_STYLE),
            ],
        );
        append_child(&indicator, create_text(constants::INDICATOR_GLYPH));
        indicator
    }
}

/// 截取前 50 个字符用于日志
fn preview(text: &str) -> String {
    text.chars().take(50).collect()
}
