use std::sync::{Arc, Mutex};

use crate::markup;
use crate::models::{Citation, Message, MessageStatus, Role};
use crate::transcript::{TranscriptEvent, TranscriptStore};

/// One projected transcript entry, ready for the view layer.
#[derive(Debug, Clone)]
pub struct Bubble {
    pub id: String,
    pub role: Role,
    pub status: MessageStatus,
    /// Sanitized markup for the message body.
    pub html: String,
    /// `%H:%M` label; absent for system notices.
    pub timestamp_label: Option<String>,
    pub attachment_html: Option<String>,
    /// Sources list; present only when a completed message carries at least
    /// one citation with a resolvable URI.
    pub citations_html: Option<String>,
}

impl Bubble {
    /// CSS class list for the bubble container.
    pub fn css_class(&self) -> String {
        let role = match self.role {
            Role::User => "message user",
            Role::Assistant => "message ai",
            Role::SystemNotice => "message ai system-message",
        };
        if self.status == MessageStatus::Errored {
            format!("{role} error")
        } else {
            role.to_string()
        }
    }
}

#[derive(Default)]
struct ViewState {
    bubbles: Vec<Bubble>,
    stick_to_latest: bool,
}

/// Live projection of the transcript store. Subscribes to store mutations
/// and keeps the view model mirroring the store's current state; every
/// mutation re-sticks the viewport to the newest entry.
#[derive(Clone, Default)]
pub struct TranscriptView {
    state: Arc<Mutex<ViewState>>,
}

impl TranscriptView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe this view to a store. All subsequent mutations are
    /// projected synchronously.
    pub fn attach(&self, store: &mut TranscriptStore) {
        let state = self.state.clone();
        store.subscribe(move |event| apply_event(&state, event));
    }

    pub fn bubbles(&self) -> Vec<Bubble> {
        self.state.lock().unwrap().bubbles.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().bubbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True after any mutation: the viewport follows the newest content.
    pub fn stick_to_latest(&self) -> bool {
        self.state.lock().unwrap().stick_to_latest
    }
}

fn apply_event(state: &Arc<Mutex<ViewState>>, event: &TranscriptEvent) {
    let mut state = state.lock().unwrap();
    match event {
        TranscriptEvent::Appended { message } => {
            let bubble = project_message(message);
            state.bubbles.push(bubble);
        }
        TranscriptEvent::Extended { id, text } => {
            // Re-render from the full accumulated text so an open code fence
            // can never be mis-rendered as inline-formatted text.
            if let Some(bubble) = state.bubbles.iter_mut().find(|b| &b.id == id) {
                bubble.html = markup::sanitize(&markup::render_markup(text));
            }
        }
        TranscriptEvent::Completed { message } | TranscriptEvent::Failed { message } => {
            if let Some(bubble) = state.bubbles.iter_mut().find(|b| b.id == message.id) {
                *bubble = project_message(message);
            }
        }
        TranscriptEvent::Cleared => state.bubbles.clear(),
    }
    state.stick_to_latest = true;
}

fn project_message(message: &Message) -> Bubble {
    let timestamp_label = match message.role {
        Role::SystemNotice => None,
        _ => Some(message.created_at.format("%H:%M").to_string()),
    };

    let attachment_html = message.attachment.as_ref().map(|att| {
        if let Some(data_uri) = &att.image_data_uri {
            format!(
                "<img src=\"{}\" alt=\"{}\">",
                data_uri,
                markup::escape_html(&att.name)
            )
        } else {
            format!(
                "<p class=\"file-note\">File referenced: {}</p>",
                markup::escape_html(&att.name)
            )
        }
    });

    let citations_html = match (message.status, message.citations.as_deref()) {
        (MessageStatus::Complete, Some(citations)) => render_citations(citations),
        _ => None,
    };

    Bubble {
        id: message.id.clone(),
        role: message.role,
        status: message.status,
        html: markup::sanitize(&markup::render_markup(&message.text())),
        timestamp_label,
        attachment_html,
        citations_html,
    }
}

/// Sources list under a completed message. Citations lacking a resolvable
/// URI are dropped, never shown as broken links.
fn render_citations(citations: &[Citation]) -> Option<String> {
    let items: Vec<String> = citations
        .iter()
        .filter_map(|c| {
            let uri = c.uri.as_deref().filter(|u| !u.trim().is_empty())?;
            let label = c
                .title
                .as_deref()
                .filter(|t| !t.trim().is_empty())
                .unwrap_or(uri);
            Some(format!(
                "<li><a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">{}</a></li>",
                markup::escape_html(uri),
                markup::escape_html(label)
            ))
        })
        .collect();

    if items.is_empty() {
        return None;
    }
    Some(markup::sanitize(&format!(
        "<div class=\"citations\"><div class=\"citations-title\">Sources:</div><ul>{}</ul></div>",
        items.join("")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttachmentRef;

    fn wired() -> (TranscriptStore, TranscriptView) {
        let mut store = TranscriptStore::new();
        let view = TranscriptView::new();
        view.attach(&mut store);
        (store, view)
    }

    #[test]
    fn test_view_mirrors_append_and_extend() {
        let (mut store, view) = wired();
        let id = store.append(Message::streaming_assistant()).unwrap();
        store.extend(&id, "**bo").unwrap();
        store.extend(&id, "ld**").unwrap();

        let bubbles = view.bubbles();
        assert_eq!(bubbles.len(), 1);
        assert!(bubbles[0].html.contains("<strong>bold</strong>"));
        assert!(view.stick_to_latest());
    }

    #[test]
    fn test_completed_message_renders_citations() {
        let (mut store, view) = wired();
        let id = store.append(Message::streaming_assistant()).unwrap();
        store.extend(&id, "answer").unwrap();
        store
            .complete(
                &id,
                Some(vec![
                    Citation {
                        uri: Some("https://example.com/a".into()),
                        title: Some("Example A".into()),
                    },
                    // No URI: silently dropped.
                    Citation {
                        uri: None,
                        title: Some("Broken".into()),
                    },
                ]),
            )
            .unwrap();

        let bubbles = view.bubbles();
        let citations = bubbles[0].citations_html.as_ref().unwrap();
        assert!(citations.contains("Sources:"));
        assert!(citations.contains("Example A"));
        assert!(!citations.contains("Broken"));
    }

    #[test]
    fn test_citations_without_any_uri_render_nothing() {
        let (mut store, view) = wired();
        let id = store.append(Message::streaming_assistant()).unwrap();
        store
            .complete(
                &id,
                Some(vec![Citation {
                    uri: None,
                    title: Some("x".into()),
                }]),
            )
            .unwrap();
        assert!(view.bubbles()[0].citations_html.is_none());
    }

    #[test]
    fn test_citation_title_falls_back_to_uri() {
        let (mut store, view) = wired();
        let id = store.append(Message::streaming_assistant()).unwrap();
        store
            .complete(
                &id,
                Some(vec![Citation {
                    uri: Some("https://example.com/b".into()),
                    title: None,
                }]),
            )
            .unwrap();
        let citations = view.bubbles()[0].citations_html.as_ref().unwrap().clone();
        assert!(citations.matches("https://example.com/b").count() >= 2);
    }

    #[test]
    fn test_errored_bubble_carries_error_class() {
        let (mut store, view) = wired();
        let id = store.append(Message::streaming_assistant()).unwrap();
        store.fail(&id, "it broke").unwrap();

        let bubble = &view.bubbles()[0];
        assert_eq!(bubble.status, MessageStatus::Errored);
        assert!(bubble.css_class().contains("error"));
        assert!(bubble.html.contains("it broke"));
    }

    #[test]
    fn test_image_attachment_projected() {
        let (mut store, view) = wired();
        let msg = Message::user(
            "look",
            Some(AttachmentRef {
                name: "photo.png".into(),
                mime: "image/png".into(),
                image_data_uri: Some("data:image/png;base64,aGVsbG8=".into()),
            }),
        );
        store.append(msg).unwrap();

        let attachment = view.bubbles()[0].attachment_html.as_ref().unwrap().clone();
        assert!(attachment.contains("<img src=\"data:image/png;base64,aGVsbG8=\""));
    }

    #[test]
    fn test_notice_has_no_timestamp() {
        let (mut store, view) = wired();
        store.append(Message::notice("hello")).unwrap();
        let bubble = &view.bubbles()[0];
        assert!(bubble.timestamp_label.is_none());
        assert!(bubble.css_class().contains("system-message"));
    }

    #[test]
    fn test_clear_empties_view() {
        let (mut store, view) = wired();
        store.append(Message::user("a", None)).unwrap();
        store.clear().unwrap();
        assert!(view.is_empty());
    }
}
