//! 节点处理状态表
//!
//! 文档节点不归翻译器所有，只能“挂标注”。标注存放在以节点地址为键的侧表中，
//! 表项持有弱引用，被移除的节点不会因此存活；失效表项会被清理。
//!
//! 每次认领都会得到一个 [`ClaimToken`]。重置后同一节点可能被再次认领，
//! 旧的认领者只能通过自己的令牌释放或完成，不会影响新的认领。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, Node};

use crate::parsers::html::dom::contains;

/// 节点处理状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessingState {
    /// 尚未处理
    #[default]
    Untouched,
    /// 等待翻译结果
    InFlight,
    /// 已应用译文
    Done,
}

/// 一次认领的凭据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimToken(u64);

/// 表项数量达到该值时顺带清理失效表项
const PRUNE_WATERMARK: usize = 64;

#[derive(Debug)]
struct Annotation {
    node: Weak<Node>,
    state: ProcessingState,
    claim: Option<ClaimToken>,
    original_text: Option<String>,
}

/// 节点标注侧表
#[derive(Debug)]
pub struct NodeStates {
    entries: RefCell<HashMap<usize, Annotation>>,
    next_claim: Cell<u64>,
    watermark: Cell<usize>,
}

impl Default for NodeStates {
    fn default() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            next_claim: Cell::new(0),
            watermark: Cell::new(PRUNE_WATERMARK),
        }
    }
}

fn key_of(node: &Handle) -> usize {
    Rc::as_ptr(node) as usize
}

impl NodeStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前状态；地址被新节点复用时视为未处理
    pub fn state(&self, node: &Handle) -> ProcessingState {
        let entries = self.entries.borrow();
        match entries.get(&key_of(node)) {
            Some(entry) if Self::is_same(entry, node) => entry.state,
            _ => ProcessingState::Untouched,
        }
    }

    /// 尝试认领节点：仅当状态为 Untouched 时置为 InFlight
    pub fn mark_in_flight(&self, node: &Handle) -> Option<ClaimToken> {
        let mut entries = self.entries.borrow_mut();
        let entry = self.entry_for(&mut entries, node);
        if entry.state != ProcessingState::Untouched {
            return None;
        }

        let token = ClaimToken(self.next_claim.get());
        self.next_claim.set(token.0 + 1);
        entry.state = ProcessingState::InFlight;
        entry.claim = Some(token);
        Some(token)
    }

    /// 认领是否仍然有效（未被重置，也未被其他认领取代）
    pub fn holds(&self, node: &Handle, token: ClaimToken) -> bool {
        let entries = self.entries.borrow();
        entries
            .get(&key_of(node))
            .map(|entry| Self::is_same(entry, node) && Self::is_held(entry, token))
            .unwrap_or(false)
    }

    /// 标记完成并记录原文（原文只写一次）。认领失效时返回 false。
    pub fn mark_done(&self, node: &Handle, token: ClaimToken, original_text: &str) -> bool {
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = Self::live_entry(&mut entries, node) else {
            return false;
        };
        if !Self::is_held(entry, token) {
            return false;
        }

        entry.state = ProcessingState::Done;
        entry.claim = None;
        if entry.original_text.is_none() {
            entry.original_text = Some(original_text.to_string());
        }
        true
    }

    /// 释放认领，回到 Untouched。认领失效时什么都不做。
    pub fn release(&self, node: &Handle, token: ClaimToken) -> bool {
        let mut entries = self.entries.borrow_mut();
        match Self::live_entry(&mut entries, node) {
            Some(entry) if Self::is_held(entry, token) => {
                entry.state = ProcessingState::Untouched;
                entry.claim = None;
                true
            }
            _ => false,
        }
    }

    /// 全部重置为 Untouched，返回此前处于 Done 的存活节点。
    /// 已记录的原文保留。
    pub fn reset_all(&self) -> Vec<Handle> {
        self.prune();

        let mut done = Vec::new();
        for entry in self.entries.borrow_mut().values_mut() {
            if entry.state == ProcessingState::Done {
                if let Some(node) = entry.node.upgrade() {
                    done.push(node);
                }
            }
            entry.state = ProcessingState::Untouched;
            entry.claim = None;
        }
        done
    }

    pub fn original_text(&self, node: &Handle) -> Option<String> {
        let entries = self.entries.borrow();
        entries
            .get(&key_of(node))
            .filter(|entry| Self::is_same(entry, node))
            .and_then(|entry| entry.original_text.clone())
    }

    /// 祖先或后代中是否已有节点处于 InFlight/Done
    pub fn is_claimed_nearby(&self, node: &Handle) -> bool {
        let entries = self.entries.borrow();
        entries.values().any(|entry| {
            if entry.state == ProcessingState::Untouched {
                return false;
            }
            match entry.node.upgrade() {
                Some(other) if !Rc::ptr_eq(&other, node) => {
                    contains(&other, node) || contains(node, &other)
                }
                _ => false,
            }
        })
    }

    /// 清理已经被释放的节点
    pub fn prune(&self) {
        let mut entries = self.entries.borrow_mut();
        self.prune_entries(&mut entries);
    }

    fn prune_entries(&self, entries: &mut HashMap<usize, Annotation>) {
        entries.retain(|_, entry| entry.node.strong_count() > 0);
        self.watermark.set((entries.len() * 2).max(PRUNE_WATERMARK));
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// 指定状态的存活节点数量
    pub fn count(&self, state: ProcessingState) -> usize {
        self.entries
            .borrow()
            .values()
            .filter(|entry| entry.state == state && entry.node.strong_count() > 0)
            .count()
    }

    fn is_same(entry: &Annotation, node: &Handle) -> bool {
        entry
            .node
            .upgrade()
            .map(|live| Rc::ptr_eq(&live, node))
            .unwrap_or(false)
    }

    fn is_held(entry: &Annotation, token: ClaimToken) -> bool {
        entry.state == ProcessingState::InFlight && entry.claim == Some(token)
    }

    fn live_entry<'a>(entries: &'a mut HashMap<usize, Annotation>, node: &Handle) -> Option<&'a mut Annotation> {
        entries
            .get_mut(&key_of(node))
            .filter(|entry| Self::is_same(entry, node))
    }

    fn entry_for<'a>(
        &self,
        entries: &'a mut HashMap<usize, Annotation>,
        node: &Handle,
    ) -> &'a mut Annotation {
        let key = key_of(node);
        let stale = entries
            .get(&key)
            .map(|entry| !Self::is_same(entry, node))
            .unwrap_or(false);
        if stale {
            entries.remove(&key);
        }

        // 聊天行会被页面持续移除，插入新表项时按水位顺带清理
        if !entries.contains_key(&key) && entries.len() >= self.watermark.get() {
            self.prune_entries(entries);
        }

        entries.entry(key).or_insert_with(|| Annotation {
            node: Rc::downgrade(node),
            state: ProcessingState::Untouched,
            claim: None,
            original_text: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{append_child, create_element};

    fn done(states: &NodeStates, node: &Handle, original: &str) {
        let token = states.mark_in_flight(node).unwrap();
        assert!(states.mark_done(node, token, original));
    }

    #[test]
    fn test_monotonic_transitions() {
        let states = NodeStates::new();
        let node = create_element("div", &[]);

        assert_eq!(states.state(&node), ProcessingState::Untouched);
        let token = states.mark_in_flight(&node).unwrap();
        assert!(states.mark_in_flight(&node).is_none());
        assert!(states.holds(&node, token));

        assert!(states.mark_done(&node, token, "hello world"));
        assert_eq!(states.state(&node), ProcessingState::Done);
        assert!(states.mark_in_flight(&node).is_none());
        assert!(!states.holds(&node, token));
    }

    #[test]
    fn test_release_returns_to_untouched() {
        let states = NodeStates::new();
        let node = create_element("div", &[]);

        let token = states.mark_in_flight(&node).unwrap();
        assert!(states.release(&node, token));
        assert_eq!(states.state(&node), ProcessingState::Untouched);
        assert!(states.mark_in_flight(&node).is_some());
    }

    #[test]
    fn test_stale_claim_cannot_touch_new_claim() {
        let states = NodeStates::new();
        let node = create_element("div", &[]);

        let old = states.mark_in_flight(&node).unwrap();
        states.reset_all();
        let new = states.mark_in_flight(&node).unwrap();
        assert_ne!(old, new);

        assert!(!states.holds(&node, old));
        assert!(!states.release(&node, old));
        assert!(!states.mark_done(&node, old, "stale"));
        assert_eq!(states.state(&node), ProcessingState::InFlight);

        assert!(states.mark_done(&node, new, "fresh"));
        assert_eq!(states.state(&node), ProcessingState::Done);
        assert_eq!(states.original_text(&node).as_deref(), Some("fresh"));
    }

    #[test]
    fn test_original_text_written_once() {
        let states = NodeStates::new();
        let node = create_element("div", &[]);

        done(&states, &node, "first");
        states.reset_all();
        done(&states, &node, "second");
        assert_eq!(states.original_text(&node).as_deref(), Some("first"));
    }

    #[test]
    fn test_reset_all_returns_done_nodes() {
        let states = NodeStates::new();
        let finished = create_element("div", &[]);
        let in_flight = create_element("div", &[]);

        done(&states, &finished, "x");
        states.mark_in_flight(&in_flight).unwrap();

        let reset = states.reset_all();
        assert_eq!(reset.len(), 1);
        assert!(Rc::ptr_eq(&reset[0], &finished));
        assert_eq!(states.state(&in_flight), ProcessingState::Untouched);
    }

    #[test]
    fn test_entries_do_not_keep_nodes_alive() {
        let states = NodeStates::new();
        {
            let node = create_element("div", &[]);
            done(&states, &node, "x");
            assert_eq!(states.len(), 1);
        }
        states.prune();
        assert!(states.is_empty());
    }

    #[test]
    fn test_dead_entries_pruned_on_insert() {
        let states = NodeStates::new();
        for _ in 0..(PRUNE_WATERMARK * 4) {
            let node = create_element("div", &[]);
            done(&states, &node, "x");
        }
        assert!(states.len() <= PRUNE_WATERMARK);

        // 存活节点不会被清理
        let live: Vec<Handle> = (0..PRUNE_WATERMARK * 2)
            .map(|_| create_element("div", &[]))
            .collect();
        for node in &live {
            done(&states, node, "y");
        }
        assert_eq!(states.count(ProcessingState::Done), live.len());
    }

    #[test]
    fn test_claimed_nearby() {
        let states = NodeStates::new();
        let parent = create_element("div", &[]);
        let child = create_element("span", &[]);
        let stranger = create_element("p", &[]);
        append_child(&parent, child.clone());

        assert!(!states.is_claimed_nearby(&child));
        states.mark_in_flight(&parent).unwrap();
        assert!(states.is_claimed_nearby(&child));
        assert!(!states.is_claimed_nearby(&parent));
        assert!(!states.is_claimed_nearby(&stranger));
    }
}
