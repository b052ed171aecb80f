use crate::error::AppError;
use crate::models::{Citation, Message, MessageStatus};

/// Store mutation broadcast to observers. Events carry message snapshots so
/// observers never need to re-enter the store.
#[derive(Debug, Clone)]
pub enum TranscriptEvent {
    Appended { message: Message },
    /// A streaming message grew; `text` is the full accumulated content.
    Extended { id: String, text: String },
    Completed { message: Message },
    Failed { message: Message },
    Cleared,
}

type Observer = Box<dyn Fn(&TranscriptEvent) + Send + Sync>;

/// Ordered, append-only log of messages. Enforces the transcript invariants:
/// at most one streaming message, append-only content, citations set once,
/// bulk-clear only.
#[derive(Default)]
pub struct TranscriptStore {
    messages: Vec<Message>,
    observers: Vec<Observer>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer. Observers are invoked synchronously after each
    /// mutation, in registration order.
    pub fn subscribe(&mut self, observer: impl Fn(&TranscriptEvent) + Send + Sync + 'static) {
        self.observers.push(Box::new(observer));
    }

    fn notify(&self, event: TranscriptEvent) {
        for observer in &self.observers {
            observer(&event);
        }
    }

    /// Add a message at the end of the log. Rejects a second streaming
    /// message while one is active.
    pub fn append(&mut self, message: Message) -> Result<String, AppError> {
        if message.is_streaming() {
            if let Some(active) = self.streaming_id() {
                return Err(AppError::ConcurrentStream(format!(
                    "message {active} is still streaming"
                )));
            }
        }
        let id = message.id.clone();
        let snapshot = message.clone();
        self.messages.push(message);
        self.notify(TranscriptEvent::Appended { message: snapshot });
        Ok(id)
    }

    /// Append a fragment to the named streaming message.
    pub fn extend(&mut self, id: &str, fragment: &str) -> Result<(), AppError> {
        let message = self.get_mut(id)?;
        if message.status != MessageStatus::Streaming {
            return Err(AppError::InvalidState(format!(
                "message {id} is not streaming"
            )));
        }
        message.content.push(fragment.to_string());
        let text = message.text();
        self.notify(TranscriptEvent::Extended {
            id: id.to_string(),
            text,
        });
        Ok(())
    }

    /// Freeze a streaming message as complete, attaching citations if the
    /// final chunk carried any. Citations transition absent → present once.
    pub fn complete(&mut self, id: &str, citations: Option<Vec<Citation>>) -> Result<(), AppError> {
        let message = self.get_mut(id)?;
        if message.status != MessageStatus::Streaming {
            return Err(AppError::InvalidState(format!(
                "message {id} is not streaming"
            )));
        }
        message.status = MessageStatus::Complete;
        if citations.is_some() {
            message.citations = citations;
        }
        let snapshot = message.clone();
        self.notify(TranscriptEvent::Completed { message: snapshot });
        Ok(())
    }

    /// Transition a streaming message to errored. The reason text replaces
    /// any partial content as the final display text.
    pub fn fail(&mut self, id: &str, reason: &str) -> Result<(), AppError> {
        let message = self.get_mut(id)?;
        if message.status != MessageStatus::Streaming {
            return Err(AppError::InvalidState(format!(
                "message {id} is not streaming"
            )));
        }
        message.status = MessageStatus::Errored;
        message.content = vec![reason.to_string()];
        let snapshot = message.clone();
        self.notify(TranscriptEvent::Failed { message: snapshot });
        Ok(())
    }

    /// Empty the transcript. Callers must settle any in-flight stream first.
    pub fn clear(&mut self) -> Result<(), AppError> {
        if let Some(active) = self.streaming_id() {
            return Err(AppError::InvalidState(format!(
                "cannot clear while message {active} is streaming"
            )));
        }
        self.messages.clear();
        self.notify(TranscriptEvent::Cleared);
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn get(&self, id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Message, AppError> {
        self.messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| AppError::NotFound(format!("message {id}")))
    }

    pub fn streaming_id(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|m| m.is_streaming())
            .map(|m| m.id.clone())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
