/// One inbound chat line, already decoded from the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatMessage {
    /// Channel the line was posted in, e.g. `#somechannel`.
    pub channel: String,
    /// Lowercase login of the sender.
    pub sender_login: String,
    pub display_name: String,
    pub text: String,
    /// The bot itself authored this line.
    pub is_self: bool,
    pub is_moderator: bool,
    pub is_broadcaster: bool,
}

/// Everything a chat client reports to whoever attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Message(ChatMessage),
    Disconnected(String),
    Error(String),
}
