//! 选择器签名
//!
//! 聊天页面的结构识别完全依赖启发式签名。这里实现一个极小的选择器子集：
//!
//! - `tag`
//! - `.class`（类名精确匹配）
//! - `[attr]`、`[attr="value"]`、`[attr*="value"]`
//! - `tag.class`、`tag[attr="value"]`
//!
//! 多个签名组成 [`SelectorChain`]，按优先级依次尝试。

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::OnceLock;

use markup5ever_rcdom::Handle;
use regex::Regex;

use super::dom::{ancestors, descendant_elements, get_node_attr, get_node_name, is_element};
use crate::translation::error::{TranslationError, TranslationResult};

fn selector_regex() -> &'static Regex {
    static SELECTOR_RE: OnceLock<Regex> = OnceLock::new();
    SELECTOR_RE.get_or_init(|| {
        Regex::new(
            r#"^(?P<tag>[a-zA-Z][a-zA-Z0-9-]*)?(?:\.(?P<class>[\w-]+)|\[(?P<attr>[\w-]+)(?:(?P<op>\*?=)"(?P<value>[^"]*)")?\])?$"#,
        )
        .expect("selector regex is valid")
    })
}

/// 单个签名的匹配条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// 只限定标签名
    Any,
    /// `.class`
    Class(String),
    /// `[attr]`
    AttrPresent(String),
    /// `[attr="value"]`
    AttrEquals(String, String),
    /// `[attr*="value"]`
    AttrContains(String, String),
}

/// 解析后的选择器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    tag: Option<String>,
    condition: Condition,
    source: String,
}

impl Selector {
    /// 解析选择器字符串
    pub fn parse(source: &str) -> TranslationResult<Self> {
        let source = source.trim();
        let captures = selector_regex()
            .captures(source)
            .ok_or_else(|| TranslationError::InvalidSelector(source.to_string()))?;

        let tag = captures.name("tag").map(|m| m.as_str().to_ascii_lowercase());

        let condition = if let Some(class) = captures.name("class") {
            Condition::Class(class.as_str().to_string())
        } else if let Some(attr) = captures.name("attr") {
            let attr = attr.as_str().to_ascii_lowercase();
            match (captures.name("op"), captures.name("value")) {
                (Some(op), Some(value)) if op.as_str() == "*=" => {
                    Condition::AttrContains(attr, value.as_str().to_string())
                }
                (Some(_), Some(value)) => Condition::AttrEquals(attr, value.as_str().to_string()),
                _ => Condition::AttrPresent(attr),
            }
        } else {
            Condition::Any
        };

        if tag.is_none() && condition == Condition::Any {
            return Err(TranslationError::InvalidSelector(source.to_string()));
        }

        Ok(Self {
            tag,
            condition,
            source: source.to_string(),
        })
    }

    /// 节点自身是否匹配
    pub fn matches(&self, node: &Handle) -> bool {
        let Some(name) = get_node_name(node) else {
            return false;
        };

        if let Some(ref tag) = self.tag {
            if !name.eq_ignore_ascii_case(tag) {
                return false;
            }
        }

        match &self.condition {
            Condition::Any => true,
            Condition::Class(class) => get_node_attr(node, "class")
                .map(|value| value.split_ascii_whitespace().any(|c| c == class))
                .unwrap_or(false),
            Condition::AttrPresent(attr) => get_node_attr(node, attr).is_some(),
            Condition::AttrEquals(attr, expected) => {
                get_node_attr(node, attr).as_deref() == Some(expected.as_str())
            }
            Condition::AttrContains(attr, needle) => get_node_attr(node, attr)
                .map(|value| value.contains(needle.as_str()))
                .unwrap_or(false),
        }
    }

    /// 第一个匹配的后代（等价于 `querySelector`，不含自身）
    pub fn query_first(&self, root: &Handle) -> Option<Handle> {
        descendant_elements(root)
            .into_iter()
            .find(|node| self.matches(node))
    }

    /// 所有匹配的后代（等价于 `querySelectorAll`）
    pub fn query_all(&self, root: &Handle) -> Vec<Handle> {
        descendant_elements(root)
            .into_iter()
            .filter(|node| self.matches(node))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Selector {
    type Err = TranslationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

/// 按优先级排列的选择器策略链
#[derive(Debug, Clone, Default)]
pub struct SelectorChain {
    selectors: Vec<Selector>,
}

impl SelectorChain {
    /// 从签名列表构建策略链
    pub fn parse(sources: &[&str]) -> TranslationResult<Self> {
        let selectors = sources
            .iter()
            .map(|source| Selector::parse(source))
            .collect::<TranslationResult<Vec<_>>>()?;
        Ok(Self { selectors })
    }

    /// 合并两条策略链，保持顺序
    pub fn concat(mut self, other: &SelectorChain) -> Self {
        self.selectors.extend(other.selectors.iter().cloned());
        self
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// 节点自身是否匹配任一签名
    pub fn matches(&self, node: &Handle) -> bool {
        is_element(node) && self.selectors.iter().any(|s| s.matches(node))
    }

    /// 按签名顺序，取每个签名的第一个后代匹配，交给 `accept` 判断，
    /// 返回第一个被接受的节点
    pub fn first_match<F>(&self, root: &Handle, mut accept: F) -> Option<(Handle, &Selector)>
    where
        F: FnMut(&Handle) -> bool,
    {
        let descendants = descendant_elements(root);
        for selector in &self.selectors {
            if let Some(found) = descendants.iter().find(|node| selector.matches(node)) {
                if accept(found) {
                    return Some((found.clone(), selector));
                }
            }
        }
        None
    }

    /// 按签名顺序返回第一个存在的后代匹配
    pub fn query_first(&self, root: &Handle) -> Option<Handle> {
        self.first_match(root, |_| true).map(|(node, _)| node)
    }

    /// 匹配任一签名的全部后代，按文档顺序去重
    pub fn query_all(&self, root: &Handle) -> Vec<Handle> {
        descendant_elements(root)
            .into_iter()
            .filter(|node| self.selectors.iter().any(|s| s.matches(node)))
            .collect()
    }

    /// 匹配的后代数量
    pub fn count_descendants(&self, root: &Handle) -> usize {
        self.query_all(root).len()
    }

    /// 是否存在匹配的后代
    pub fn has_descendant(&self, root: &Handle) -> bool {
        descendant_elements(root)
            .iter()
            .any(|node| self.selectors.iter().any(|s| s.matches(node)))
    }

    /// 自身或最近的匹配祖先（等价于 `closest`）
    pub fn closest(&self, node: &Handle) -> Option<Handle> {
        if self.matches(node) {
            return Some(node.clone());
        }
        ancestors(node).into_iter().find(|a| self.matches(a))
    }

    /// 自身及后代中的所有匹配节点
    pub fn self_and_descendants(&self, root: &Handle) -> Vec<Handle> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        if self.matches(root) {
            seen.insert(Rc::as_ptr(root));
            found.push(root.clone());
        }
        for node in self.query_all(root) {
            if seen.insert(Rc::as_ptr(&node)) {
                found.push(node);
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{find_nodes, html_to_dom};

    #[test]
    fn test_parse_forms() {
        let s = Selector::parse(".chat-line").unwrap();
        assert_eq!(s.condition, Condition::Class("chat-line".to_string()));

        let s = Selector::parse(r#"[data-a-target*="message"]"#).unwrap();
        assert_eq!(
            s.condition,
            Condition::AttrContains("data-a-target".to_string(), "message".to_string())
        );

        let s = Selector::parse(r#"span[data-a-target="chat-message-text"]"#).unwrap();
        assert_eq!(s.tag.as_deref(), Some("span"));
        assert_eq!(
            s.condition,
            Condition::AttrEquals("data-a-target".to_string(), "chat-message-text".to_string())
        );

        let s = Selector::parse("img").unwrap();
        assert_eq!(s.condition, Condition::Any);

        assert!(Selector::parse("").is_err());
        assert!(Selector::parse("div > span").is_err());
        assert!(Selector::parse(r#"[data-x="unterminated]"#).is_err());
    }

    #[test]
    fn test_class_token_vs_substring() {
        let dom = html_to_dom(
            br#"<div class="chat-line__message other"></div>"#,
            "utf-8".to_string(),
        );
        let div = find_nodes(&dom.document, vec!["div"]).remove(0);

        assert!(!Selector::parse(".chat-line").unwrap().matches(&div));
        assert!(Selector::parse(".chat-line__message").unwrap().matches(&div));
        assert!(Selector::parse(r#"[class*="chat-line"]"#).unwrap().matches(&div));
        assert!(!Selector::parse("span.other").unwrap().matches(&div));
    }

    #[test]
    fn test_chain_priority_order() {
        let dom = html_to_dom(
            br#"<div id="root"><span class="b">second</span><span class="a">first</span></div>"#,
            "utf-8".to_string(),
        );
        let root = find_nodes(&dom.document, vec!["div"]).remove(0);

        let chain = SelectorChain::parse(&[".a", ".b"]).unwrap();
        let found = chain.query_first(&root).unwrap();
        assert_eq!(get_node_attr(&found, "class").as_deref(), Some("a"));

        // query_all 按文档顺序
        let all = chain.query_all(&root);
        assert_eq!(all.len(), 2);
        assert_eq!(get_node_attr(&all[0], "class").as_deref(), Some("b"));
    }

    #[test]
    fn test_first_match_skips_rejected() {
        let dom = html_to_dom(
            br#"<div><span class="a"> </span><span class="b">ok</span></div>"#,
            "utf-8".to_string(),
        );
        let root = find_nodes(&dom.document, vec!["div"]).remove(0);
        let chain = SelectorChain::parse(&[".a", ".b"]).unwrap();

        let (found, selector) = chain
            .first_match(&root, |n| !crate::parsers::html::dom::text_content(n).trim().is_empty())
            .unwrap();
        assert_eq!(selector.as_str(), ".b");
        assert_eq!(get_node_attr(&found, "class").as_deref(), Some("b"));
    }

    #[test]
    fn test_closest() {
        let dom = html_to_dom(
            br#"<section data-a-target="chat-room"><div><p>hi</p></div></section>"#,
            "utf-8".to_string(),
        );
        let p = find_nodes(&dom.document, vec!["p"]).remove(0);
        let chain = SelectorChain::parse(&[r#"[data-a-target*="chat"]"#]).unwrap();

        let found = chain.closest(&p).unwrap();
        assert_eq!(get_node_name(&found), Some("section"));
    }
}
