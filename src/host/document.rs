//! 宿主文档
//!
//! 聊天页面由外部 UI 持续追加内容。`rcdom` 本身没有变更通知，
//! 所有结构性插入都经由 [`LiveDocument`] 完成，由它把变更记录投递给
//! 作用域覆盖目标节点的观察者。

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, Node, RcDom};
use tokio::sync::mpsc;

use crate::parsers::html::dom::{
    append_child, contains, detach, find_nodes, get_parent_node, html_to_dom, parse_fragment,
    remove_children,
};
use crate::parsers::html::serializer::serialize_document;
use crate::translation::error::TranslationResult;

/// 一次结构性变更
#[derive(Debug, Clone)]
pub struct MutationRecord {
    /// 子节点列表发生变化的节点
    pub target: Handle,
    pub added_nodes: Vec<Handle>,
    pub removed_nodes: Vec<Handle>,
}

struct ObserverSlot {
    id: u64,
    scope: Weak<Node>,
    sender: mpsc::UnboundedSender<MutationRecord>,
}

/// 可观察的文档
pub struct LiveDocument {
    dom: RcDom,
    observers: RefCell<Vec<ObserverSlot>>,
    next_id: Cell<u64>,
}

impl LiveDocument {
    /// 解析 HTML 字节
    pub fn parse(data: &[u8], encoding: &str) -> Rc<Self> {
        Self::from_dom(html_to_dom(data, encoding.to_string()))
    }

    pub fn from_dom(dom: RcDom) -> Rc<Self> {
        Rc::new(Self {
            dom,
            observers: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        })
    }

    /// 文档根节点
    pub fn document(&self) -> &Handle {
        &self.dom.document
    }

    pub fn body(&self) -> Option<Handle> {
        find_nodes(&self.dom.document, vec!["html", "body"])
            .into_iter()
            .next()
    }

    /// 订阅 `scope` 子树内的结构性变更（含子树深处）
    pub fn observe(self: &Rc<Self>, scope: &Handle) -> MutationSubscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);

        let (sender, receiver) = mpsc::unbounded_channel();
        self.observers.borrow_mut().push(ObserverSlot {
            id,
            scope: Rc::downgrade(scope),
            sender,
        });
        tracing::debug!("注册变更观察者 #{}", id);

        MutationSubscription {
            id,
            document: Rc::downgrade(self),
            receiver,
        }
    }

    /// 注销观察者
    pub fn disconnect(&self, id: u64) {
        self.observers.borrow_mut().retain(|slot| slot.id != id);
    }

    /// 当前存活的观察者数量
    pub fn observer_count(&self) -> usize {
        let mut observers = self.observers.borrow_mut();
        observers.retain(|slot| !slot.sender.is_closed());
        observers.len()
    }

    /// 解析 HTML 片段并追加到 `parent` 末尾，返回新增的顶层节点
    pub fn append_html(&self, parent: &Handle, html: &str) -> Vec<Handle> {
        self.append_nodes(parent, parse_fragment(html))
    }

    /// 追加节点并通知观察者
    pub fn append_nodes(&self, parent: &Handle, nodes: Vec<Handle>) -> Vec<Handle> {
        for node in &nodes {
            append_child(parent, node.clone());
        }
        self.notify(MutationRecord {
            target: parent.clone(),
            added_nodes: nodes.clone(),
            removed_nodes: Vec::new(),
        });
        nodes
    }

    /// 移除节点并通知观察者
    pub fn remove(&self, node: &Handle) {
        let Some(parent) = get_parent_node(node) else {
            return;
        };
        detach(node);
        self.notify(MutationRecord {
            target: parent,
            added_nodes: Vec::new(),
            removed_nodes: vec![node.clone()],
        });
    }

    /// 用新的 HTML 替换 `parent` 的全部子节点（模拟单页应用导航）
    pub fn replace_children(&self, parent: &Handle, html: &str) -> Vec<Handle> {
        let removed: Vec<Handle> = parent.children.borrow().clone();
        remove_children(parent);

        let added = parse_fragment(html);
        for node in &added {
            append_child(parent, node.clone());
        }
        self.notify(MutationRecord {
            target: parent.clone(),
            added_nodes: added.clone(),
            removed_nodes: removed,
        });
        added
    }

    /// 节点是否仍挂在文档树上
    pub fn is_attached(&self, node: &Handle) -> bool {
        contains(&self.dom.document, node)
    }

    pub fn serialize(&self, encoding: &str) -> TranslationResult<Vec<u8>> {
        serialize_document(&self.dom.document, encoding)
    }

    fn notify(&self, record: MutationRecord) {
        let mut observers = self.observers.borrow_mut();
        observers.retain(|slot| !slot.sender.is_closed() && slot.scope.strong_count() > 0);

        for slot in observers.iter() {
            let Some(scope) = slot.scope.upgrade() else {
                continue;
            };
            if contains(&scope, &record.target) {
                // 接收端关闭时下次通知会清理
                let _ = slot.sender.send(record.clone());
            }
        }
    }
}

/// 变更订阅，丢弃时自动注销
pub struct MutationSubscription {
    id: u64,
    document: Weak<LiveDocument>,
    receiver: mpsc::UnboundedReceiver<MutationRecord>,
}

impl MutationSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 等待下一条变更记录；文档被释放后返回 `None`
    pub async fn next(&mut self) -> Option<MutationRecord> {
        self.receiver.recv().await
    }

    /// 非阻塞读取
    pub fn try_next(&mut self) -> Option<MutationRecord> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for MutationSubscription {
    fn drop(&mut self) {
        if let Some(document) = self.document.upgrade() {
            document.disconnect(self.id);
            tracing::debug!("注销变更观察者 #{}", self.id);
        }
    }
}
