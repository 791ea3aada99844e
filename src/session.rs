use crate::client::{ChatClient, ChatError, ChatOptions};
use crate::model::{Message, MessageRole};
use crate::prompt::FormatStyle;

const MAX_HISTORY_MESSAGES: usize = 40;

/// An in-memory conversation seeded with a formatting system message.
pub struct ChatSession<'a> {
    client: &'a ChatClient,
    style: FormatStyle,
    history: Vec<Message>,
}

impl<'a> ChatSession<'a> {
    pub fn new(client: &'a ChatClient, style: FormatStyle) -> Self {
        Self {
            client,
            style,
            history: vec![system_message(style)],
        }
    }

    pub fn reset(&mut self) {
        self.history = vec![system_message(self.style)];
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Sends one user turn. The history only changes once a reply arrives, so
    /// a failed turn leaves it exactly as it was.
    pub async fn run_turn(&mut self, user_input: &str) -> Result<String, ChatError> {
        let mut outgoing = self.history.clone();
        outgoing.push(Message::user(user_input));
        let mut outgoing = trimmed(outgoing, MAX_HISTORY_MESSAGES);

        let reply = self.client.send(&outgoing, ChatOptions::default()).await?;

        outgoing.push(Message::assistant(reply.clone()));
        self.history = trimmed(outgoing, MAX_HISTORY_MESSAGES);
        Ok(reply)
    }
}

fn system_message(style: FormatStyle) -> Message {
    Message::system(style.instructions())
}

/// Keeps the leading system message plus the most recent turns. The kept tail
/// always starts on a user message so no reply is left without its question.
fn trimmed(history: Vec<Message>, max_messages: usize) -> Vec<Message> {
    if history.len() <= max_messages {
        return history;
    }

    let pinned = usize::from(history.first().is_some_and(Message::is_system));
    let keep_tail = max_messages.saturating_sub(pinned);
    let mut tail_start = history.len().saturating_sub(keep_tail).max(pinned);
    while tail_start < history.len() && history[tail_start].role != MessageRole::User {
        tail_start += 1;
    }

    let mut kept = Vec::with_capacity(max_messages);
    kept.extend_from_slice(&history[..pinned]);
    kept.extend_from_slice(&history[tail_start..]);
    kept
}

/// Inserts a system message at the front unless the conversation already has one.
pub fn ensure_system_message(messages: &mut Vec<Message>, style: FormatStyle) {
    if !messages.iter().any(Message::is_system) {
        messages.insert(0, system_message(style));
    }
}
