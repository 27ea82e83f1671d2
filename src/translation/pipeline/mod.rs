//! 翻译管道模块
//!
//! 提供消息分类、文本提取和过滤

pub mod classifier;
pub mod extractor;
pub mod filters;

// 重新导出主要类型
pub use classifier::{
    Classification, ContainerStrategy, DensityStrategy, MessageClassifier, SignatureStrategy,
};
pub use extractor::TextExtractor;
pub use filters::TextFilter;
