//! 宿主环境
//!
//! 翻译器之外、由宿主提供的协作者：可观察的文档树、偏好设置存储和控制通道。

pub mod control;
pub mod document;
pub mod preferences;

pub use control::{control_channel, ControlCommand, ControlHandle, ControlReceiver, ControlResponse};
pub use document::{LiveDocument, MutationRecord, MutationSubscription};
pub use preferences::{
    MemoryBackend, PreferenceBackend, PreferenceChanges, PreferenceStore, PreferenceUpdate,
    Preferences, TomlFileBackend,
};
