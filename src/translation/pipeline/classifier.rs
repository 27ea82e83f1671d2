//! 消息分类器
//!
//! 判断节点是单条消息、消息容器还是无关节点，并定位聊天滚动容器。
//! 容器定位是一条有序的策略链：先按结构签名，再按内容密度。

use markup5ever_rcdom::Handle;

use crate::parsers::html::dom::{is_element, text_content};
use crate::parsers::html::selector::SelectorChain;
use crate::translation::config::{constants, signatures, TranslatorConfig};
use crate::translation::error::TranslationResult;

/// 分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Message,
    Container,
    Irrelevant,
}

/// 容器定位策略
pub trait ContainerStrategy {
    /// 策略名称，用于日志
    fn name(&self) -> &'static str;

    fn locate(&self, root: &Handle) -> Option<Handle>;
}

/// 按结构签名定位（属性签名优先于类名签名）
#[derive(Debug, Clone)]
pub struct SignatureStrategy {
    chain: SelectorChain,
}

impl SignatureStrategy {
    pub fn new() -> TranslationResult<Self> {
        Ok(Self {
            chain: SelectorChain::parse(signatures::CONTAINER)?,
        })
    }
}

impl ContainerStrategy for SignatureStrategy {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn locate(&self, root: &Handle) -> Option<Handle> {
        self.chain.query_first(root)
    }
}

/// 按内容密度定位：聊天相关元素，文本足够长且含有多条消息行
#[derive(Debug, Clone)]
pub struct DensityStrategy {
    candidates: SelectorChain,
    rows: SelectorChain,
    min_text_length: usize,
}

impl DensityStrategy {
    pub fn new(min_text_length: usize) -> TranslationResult<Self> {
        Ok(Self {
            candidates: SelectorChain::parse(signatures::DENSITY)?,
            rows: SelectorChain::parse(signatures::MESSAGE_ROW)?,
            min_text_length,
        })
    }
}

impl ContainerStrategy for DensityStrategy {
    fn name(&self) -> &'static str {
        "density"
    }

    fn locate(&self, root: &Handle) -> Option<Handle> {
        self.candidates.query_all(root).into_iter().find(|node| {
            text_content(node).trim().chars().count() > self.min_text_length
                && self.rows.count_descendants(node) >= constants::CONTAINER_MIN_MESSAGE_ROWS
        })
    }
}

/// 消息分类器
pub struct MessageClassifier {
    strategies: Vec<Box<dyn ContainerStrategy>>,
    candidates: SelectorChain,
    rows: SelectorChain,
    own_markers: SelectorChain,
    descendant_markers: SelectorChain,
    chat_ancestor: SelectorChain,
    decoration_nodes: SelectorChain,
    min_length: usize,
    max_length: usize,
}

impl MessageClassifier {
    pub fn new() -> TranslationResult<Self> {
        Self::from_config(&TranslatorConfig::default())
    }

    pub fn from_config(config: &TranslatorConfig) -> TranslationResult<Self> {
        let strategies: Vec<Box<dyn ContainerStrategy>> = vec![
            Box::new(SignatureStrategy::new()?),
            Box::new(DensityStrategy::new(config.container_min_text_length)?),
        ];

        Ok(Self {
            strategies,
            candidates: SelectorChain::parse(signatures::CANDIDATE)?,
            rows: SelectorChain::parse(signatures::MESSAGE_ROW)?,
            own_markers: SelectorChain::parse(signatures::OWN_MARKER)?,
            descendant_markers: SelectorChain::parse(signatures::DESCENDANT_MARKER)?,
            chat_ancestor: SelectorChain::parse(signatures::CHAT_ANCESTOR)?,
            decoration_nodes: SelectorChain::parse(signatures::DECORATION_NODE)?,
            min_length: config.min_text_length,
            max_length: config.max_text_length,
        })
    }

    /// 依次尝试各策略定位聊天容器
    pub fn locate_container(&self, root: &Handle) -> Option<Handle> {
        for strategy in &self.strategies {
            if let Some(container) = strategy.locate(root) {
                tracing::debug!("通过 {} 策略找到聊天容器", strategy.name());
                return Some(container);
            }
        }
        None
    }

    /// 所有候选消息节点，按文档顺序
    pub fn find_candidates(&self, root: &Handle) -> Vec<Handle> {
        self.candidates.query_all(root)
    }

    /// 节点是否具备消息特征
    pub fn is_message_shaped(&self, node: &Handle) -> bool {
        self.own_markers.matches(node)
            || self.descendant_markers.has_descendant(node)
            || self.chat_ancestor.closest(node).is_some()
    }

    /// 对节点分类
    pub fn classify(&self, node: &Handle) -> Classification {
        if !is_element(node) || self.decoration_nodes.matches(node) {
            return Classification::Irrelevant;
        }

        if !self.is_message_shaped(node) {
            return Classification::Irrelevant;
        }

        if self.rows.count_descendants(node) > 1 {
            return Classification::Container;
        }

        let length = text_content(node).trim().chars().count();
        if length < self.min_length || length > self.max_length {
            return Classification::Irrelevant;
        }

        Classification::Message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{create_text, find_nodes, get_node_attr, html_to_dom};

    fn by_id(dom: &markup5ever_rcdom::RcDom, id: &str) -> Handle {
        crate::parsers::html::dom::descendant_elements(&dom.document)
            .into_iter()
            .find(|n| get_node_attr(n, "id").as_deref() == Some(id))
            .expect("element by id")
    }

    #[test]
    fn test_locate_by_signature() {
        let dom = html_to_dom(
            br#"<body><div class="chat-list"><div id="inner" data-a-target="chat-scrollable-area"></div></div></body>"#,
            "utf-8".to_string(),
        );
        let classifier = MessageClassifier::new().unwrap();
        let container = classifier.locate_container(&dom.document).unwrap();
        // 签名按优先级而不是文档顺序
        assert_eq!(get_node_attr(&container, "id").as_deref(), Some("inner"));
    }

    #[test]
    fn test_locate_by_density() {
        let long = "word ".repeat(30);
        let html = format!(
            r#"<body><div id="chatbox"><div class="chat-line">{long}</div><div class="chat-line">{long}</div></div><div id="other"></div></body>"#
        );
        let dom = html_to_dom(html.as_bytes(), "utf-8".to_string());
        let classifier = MessageClassifier::new().unwrap();
        let container = classifier.locate_container(&dom.document).unwrap();
        assert_eq!(get_node_attr(&container, "id").as_deref(), Some("chatbox"));
    }

    #[test]
    fn test_no_container() {
        let dom = html_to_dom(b"<body><p>nothing here</p></body>", "utf-8".to_string());
        let classifier = MessageClassifier::new().unwrap();
        assert!(classifier.locate_container(&dom.document).is_none());
    }

    #[test]
    fn test_container_vs_message() {
        let dom = html_to_dom(
            br#"<div id="wrap" data-a-target="chat-scrollable-area">
                <div id="m1" class="chat-line"><span class="text-fragment">hello there</span></div>
                <div id="m2" class="chat-line"><span class="text-fragment">general kenobi</span></div>
            </div>"#,
            "utf-8".to_string(),
        );
        let classifier = MessageClassifier::new().unwrap();
        assert_eq!(classifier.classify(&by_id(&dom, "wrap")), Classification::Container);
        assert_eq!(classifier.classify(&by_id(&dom, "m1")), Classification::Message);
    }

    #[test]
    fn test_irrelevant_nodes() {
        let dom = html_to_dom(
            br#"<body><p id="plain">not chat at all</p>
            <div data-a-target="chat-scrollable-area">
                <div id="short" class="chat-line">x</div>
                <span id="user" data-a-target="chat-message-username">bob</span>
            </div></body>"#,
            "utf-8".to_string(),
        );
        let classifier = MessageClassifier::new().unwrap();
        assert_eq!(classifier.classify(&by_id(&dom, "plain")), Classification::Irrelevant);
        assert_eq!(classifier.classify(&by_id(&dom, "short")), Classification::Irrelevant);
        assert_eq!(classifier.classify(&by_id(&dom, "user")), Classification::Irrelevant);
        assert_eq!(classifier.classify(&create_text("hello")), Classification::Irrelevant);
    }

    #[test]
    fn test_too_long_is_irrelevant() {
        let html = format!(r#"<div id="long" class="chat-line">{}</div>"#, "y".repeat(501));
        let dom = html_to_dom(html.as_bytes(), "utf-8".to_string());
        let classifier = MessageClassifier::new().unwrap();
        assert_eq!(classifier.classify(&by_id(&dom, "long")), Classification::Irrelevant);
    }

    #[test]
    fn test_find_candidates_document_order() {
        let dom = html_to_dom(
            br#"<div data-a-target="chat-scrollable-area"><div class="chat-line">a b</div><div data-a-target="chat-line-message">c d</div></div>"#,
            "utf-8".to_string(),
        );
        let classifier = MessageClassifier::new().unwrap();
        let root = find_nodes(&dom.document, vec!["body"]).remove(0);
        let found = classifier.find_candidates(&root);
        assert_eq!(found.len(), 2);
        assert_eq!(get_node_attr(&found[0], "class").as_deref(), Some("chat-line"));
    }
}
