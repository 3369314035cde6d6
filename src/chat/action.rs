//! Pure state reducer
//!
//! Every mutation of `ChatState` goes through `reduce`. It performs no I/O;
//! the session decides what to persist and broadcast afterwards.

use super::types::{ChatState, Message, MessageStatus};

/// Partial update applied to one message, matched by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageUpdate {
    pub text: Option<String>,
    pub status: Option<MessageStatus>,
}

impl MessageUpdate {
    pub fn status(status: MessageStatus) -> Self {
        Self {
            text: None,
            status: Some(status),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            status: None,
        }
    }

    pub fn failed(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            status: Some(MessageStatus::Error),
        }
    }
}

/// Actions accepted by the reducer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    SetMessages(Vec<Message>),
    AddMessage(Message),
    UpdateMessage { id: String, update: MessageUpdate },
    SetTyping(bool),
    SetError(Option<String>),
    ClearMessages,
}

impl ChatAction {
    pub fn update(id: impl Into<String>, update: MessageUpdate) -> Self {
        ChatAction::UpdateMessage {
            id: id.into(),
            update,
        }
    }

    /// Whether applying this action can change the message list
    pub fn touches_messages(&self) -> bool {
        !matches!(self, ChatAction::SetTyping(_) | ChatAction::SetError(_))
    }
}

pub fn reduce(mut state: ChatState, action: ChatAction) -> ChatState {
    match action {
        ChatAction::SetMessages(messages) => {
            state.messages = messages;
        }
        ChatAction::AddMessage(message) => {
            // Ids are unique within a session; a duplicate add is dropped.
            if state.find(&message.id).is_none() {
                state.messages.push(message);
            }
        }
        ChatAction::UpdateMessage { id, update } => {
            if let Some(message) = state.messages.iter_mut().find(|m| m.id == id) {
                if let Some(text) = update.text {
                    message.text = text;
                }
                if let Some(status) = update.status {
                    message.status = status;
                }
            }
        }
        ChatAction::SetTyping(typing) => {
            state.is_typing = typing;
        }
        ChatAction::SetError(error) => {
            state.error = error;
        }
        ChatAction::ClearMessages => {
            state.messages.clear();
        }
    }
    state
}
