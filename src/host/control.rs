//! 控制通道
//!
//! 外部控制面发送 `{"action":"reloadSettings"}`，翻译器重新读取偏好、
//! 清空缓存与状态并全量重扫，随后回复 `{"success":true}`。

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::translation::error::{TranslationError, TranslationResult};

/// 控制命令
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ControlCommand {
    ReloadSettings,
}

impl ControlCommand {
    pub fn from_json(json: &str) -> TranslationResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| TranslationError::InternalError(format!("无效的控制命令: {}", e)))
    }
}

/// 命令回执
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
}

impl ControlResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }

    pub fn failed() -> Self {
        Self { success: false }
    }
}

/// 一条待处理的命令及其回执通道
#[derive(Debug)]
pub struct ControlRequest {
    pub command: ControlCommand,
    pub reply: oneshot::Sender<ControlResponse>,
}

pub type ControlReceiver = mpsc::UnboundedReceiver<ControlRequest>;

/// 发送端句柄，可克隆
#[derive(Debug, Clone)]
pub struct ControlHandle {
    sender: mpsc::UnboundedSender<ControlRequest>,
}

/// 创建控制通道
pub fn control_channel() -> (ControlHandle, ControlReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (ControlHandle { sender }, receiver)
}

impl ControlHandle {
    /// 发送命令并等待回执
    pub async fn send(&self, command: ControlCommand) -> TranslationResult<ControlResponse> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(ControlRequest { command, reply })
            .map_err(|_| TranslationError::ControlChannelClosed)?;
        response.await.map_err(|_| TranslationError::ControlChannelClosed)
    }

    pub async fn reload_settings(&self) -> TranslationResult<ControlResponse> {
        self.send(ControlCommand::ReloadSettings).await
    }

    /// 处理 JSON 形式的命令，返回 JSON 回执
    pub async fn send_json(&self, json: &str) -> TranslationResult<String> {
        let command = ControlCommand::from_json(json)?;
        let response = self.send(command).await?;
        serde_json::to_string(&response)
            .map_err(|e| TranslationError::InternalError(format!("无法序列化回执: {}", e)))
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let command = ControlCommand::from_json(r#"{"action":"reloadSettings"}"#).unwrap();
        assert_eq!(command, ControlCommand::ReloadSettings);
        assert_eq!(
            serde_json::to_string(&ControlResponse::ok()).unwrap(),
            r#"{"success":true}"#
        );
        assert!(ControlCommand::from_json(r#"{"action":"explode"}"#).is_err());
    }

    #[tokio::test]
    async fn test_closed_channel() {
        let (handle, receiver) = control_channel();
        drop(receiver);
        assert!(handle.is_closed());
        assert_eq!(
            handle.reload_settings().await.unwrap_err(),
            TranslationError::ControlChannelClosed
        );
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let (handle, mut receiver) = control_channel();
        let responder = async {
            let request = receiver.recv().await.unwrap();
            assert_eq!(request.command, ControlCommand::ReloadSettings);
            request.reply.send(ControlResponse::ok()).unwrap();
        };
        let (reply, ()) = tokio::join!(handle.send_json(r#"{"action":"reloadSettings"}"#), responder);
        assert_eq!(reply.unwrap(), r#"{"success":true}"#);
    }
}
