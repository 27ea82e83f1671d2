//! HTML解析和处理模块
//!
//! - `dom`: 基础DOM操作（属性、文本、节点增删、深拷贝）
//! - `selector`: 选择器签名与策略链
//! - `serializer`: 序列化功能

pub mod dom;
pub mod selector;
pub mod serializer;

pub use dom::{
    ancestors, append_child, child_elements, contains, create_element, create_text,
    deep_clone, descendant_elements, descendant_text_nodes, detach, find_nodes, get_node_attr,
    get_node_name, get_parent_node, html_to_dom, is_element, parse_fragment, remove_children,
    set_node_attr, set_text_content, text_content,
};
pub use selector::{Condition, Selector, SelectorChain};
pub use serializer::{serialize_document, serialize_node};
