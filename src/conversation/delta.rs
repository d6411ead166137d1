use crate::error::{ ChatError, ChatResult };
use crate::models::chat::{ ResponseDelta, ServerEvent };

/// Turns cumulative assistant text into suffix deltas.
#[derive(Debug, Default)]
pub struct DeltaAssembler {
    previous: Option<String>,
}

impl DeltaAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the event reveals no new text. A cumulative text that does
    /// not extend the previous one is malformed.
    pub fn push(&mut self, event: &ServerEvent) -> ChatResult<Option<ResponseDelta>> {
        let current = event.message.text();
        let content = match self.previous.as_deref() {
            None => current,
            Some(previous) =>
                current
                    .strip_prefix(previous)
                    .ok_or_else(|| {
                        ChatError::malformed(
                            format!(
                                "cumulative text of message {} no longer extends the previous event",
                                event.message.id
                            )
                        )
                    })?,
        };

        let delta = if content.is_empty() {
            None
        } else {
            Some(ResponseDelta {
                content: content.to_string(),
                message_id: event.message.id.clone(),
                parent_id: event.message.metadata.parent_id.clone(),
                conversation_id: event.conversation_id.clone(),
            })
        };
        self.previous = Some(current.to_string());
        Ok(delta)
    }

    pub fn text(&self) -> &str {
        self.previous.as_deref().unwrap_or("")
    }
}
