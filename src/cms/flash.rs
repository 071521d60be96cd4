use serde::Serialize;

/// 一条闪存消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// 闪存消息，读取即删除
#[derive(Debug, Clone, Default)]
pub struct FlashBag {
    messages: Vec<FlashMessage>,
}

impl FlashBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: impl Into<String>, message: impl Into<String>) {
        self.messages.push(FlashMessage {
            kind: kind.into(),
            message: message.into(),
        });
    }

    /// 取出指定类型（或全部）的消息
    pub fn take(&mut self, kind: Option<&str>) -> Vec<FlashMessage> {
        let (taken, kept): (Vec<FlashMessage>, Vec<FlashMessage>) = std::mem::take(&mut self.messages)
            .into_iter()
            .partition(|m| kind.map_or(true, |kind| m.kind == kind));
        self.messages = kept;
        taken
    }
}
