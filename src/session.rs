use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::engine::gemini::{Content, GenerateRequest, GenerationBackend, Part};
use crate::engine::speech::{SpeechDispatcher, SpeechSynthesizer};
use crate::engine::stream::StreamConsumer;
use crate::error::AppError;
use crate::models::{AttachmentData, FileInput, Message, PendingAttachment, Persona};
use crate::prefs::{Preferences, PreferencesStore, Theme};
use crate::render::TranscriptView;
use crate::transcript::TranscriptStore;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Clears the busy flag on every exit path of a guarded operation.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the single active conversation context: persona, remote-side history,
/// pending attachment, and the at-most-one-in-flight-generation guard.
pub struct SessionController {
    backend: Arc<dyn GenerationBackend>,
    speech: SpeechDispatcher,
    store: Arc<Mutex<TranscriptStore>>,
    view: TranscriptView,
    prefs_store: PreferencesStore,
    prefs: Mutex<Preferences>,
    persona: Mutex<Persona>,
    history: Mutex<Vec<Content>>,
    pending: Mutex<Option<PendingAttachment>>,
    busy: Arc<AtomicBool>,
    cancel: Mutex<CancellationToken>,
    idle_timeout: Duration,
    web_search: AtomicBool,
}

impl SessionController {
    /// Build a controller with the last-used preferences and post the
    /// persona's greeting.
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        prefs_store: PreferencesStore,
    ) -> Self {
        let prefs = prefs_store.load();
        let speech = SpeechDispatcher::new(synthesizer, prefs.speak_responses);

        let store = Arc::new(Mutex::new(TranscriptStore::new()));
        let view = TranscriptView::new();
        view.attach(&mut store.lock().unwrap());

        let controller = Self {
            backend,
            speech,
            store,
            view,
            prefs_store,
            prefs: Mutex::new(prefs),
            persona: Mutex::new(prefs.persona),
            history: Mutex::new(Vec::new()),
            pending: Mutex::new(None),
            busy: Arc::new(AtomicBool::new(false)),
            cancel: Mutex::new(CancellationToken::new()),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            web_search: AtomicBool::new(true),
        };

        let greeting = Message::notice(prefs.persona.greeting());
        if let Err(e) = controller.store.lock().unwrap().append(greeting) {
            tracing::error!(%e, "could not post greeting");
        }
        controller
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    fn acquire_busy(&self, operation: &str) -> Result<BusyGuard, AppError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AppError::ConcurrentStream(format!(
                "{operation} rejected while a generation is active"
            )));
        }
        Ok(BusyGuard(self.busy.clone()))
    }

    /// Send user input (and any staged attachment) to the remote model and
    /// stream the reply into the transcript.
    ///
    /// No-op when there is nothing to send. Rejected with
    /// `ConcurrentStream` while a prior generation is in flight. Remote
    /// failures surface as an errored transcript message, not as an `Err`.
    pub async fn send(&self, text: &str) -> Result<(), AppError> {
        let text = text.trim();
        if text.is_empty() && self.pending.lock().unwrap().is_none() {
            return Ok(());
        }

        let _busy = self.acquire_busy("send")?;

        let staged = self.pending.lock().unwrap().take();
        let attachment_ref = staged.as_ref().map(|a| a.display_ref());

        let mut parts = Vec::new();
        if !text.is_empty() {
            parts.push(Part::text(text));
        }
        if let Some(att) = &staged {
            match &att.data {
                AttachmentData::Image { base64 } => {
                    parts.push(Part::inline_image(att.mime.clone(), base64.clone()));
                }
                _ => {
                    if let Some(note) = att.outbound_text() {
                        parts.push(Part::text(note));
                    }
                }
            }
        }

        let persona = *self.persona.lock().unwrap();
        let request = {
            let mut history = self.history.lock().unwrap();
            history.push(Content::user(parts));
            GenerateRequest {
                system_instruction: persona.system_instruction().to_string(),
                contents: history.clone(),
                web_search: self.web_search.load(Ordering::SeqCst),
            }
        };

        let message_id = {
            let mut store = self.store.lock().unwrap();
            store.append(Message::user(text, attachment_ref))?;
            store.append(Message::streaming_assistant())?
        };

        let cancel = {
            let mut current = self.cancel.lock().unwrap();
            *current = CancellationToken::new();
            current.clone()
        };

        let mut consumer =
            StreamConsumer::new(self.store.clone(), self.speech.clone(), self.idle_timeout);
        match consumer
            .run(self.backend.as_ref(), request, &message_id, persona, cancel)
            .await
        {
            Ok(reply) => {
                self.history.lock().unwrap().push(Content::model_text(reply));
                Ok(())
            }
            Err(error) => {
                // The remote never answered this turn; drop it from history
                // so the conversation state stays in sync with the model.
                self.history.lock().unwrap().pop();
                match error {
                    AppError::RemoteCall(_) => Ok(()),
                    other => Err(other),
                }
            }
        }
    }

    /// Clear the transcript, discard the session context, and post the
    /// persona's reset notice. Rejected while a generation is in flight.
    pub fn reset(&self) -> Result<(), AppError> {
        let _busy = self.acquire_busy("reset")?;
        self.reset_inner()
    }

    fn reset_inner(&self) -> Result<(), AppError> {
        self.pending.lock().unwrap().take();
        self.history.lock().unwrap().clear();

        let persona = *self.persona.lock().unwrap();
        {
            let mut store = self.store.lock().unwrap();
            store.clear()?;
            store.append(Message::notice(persona.reset_notice()))?;
        }
        self.speech.speak("Chat cleared.");
        Ok(())
    }

    /// Switch persona and restart the session under it.
    pub fn set_persona(&self, persona: Persona) -> Result<(), AppError> {
        let _busy = self.acquire_busy("persona change")?;
        *self.persona.lock().unwrap() = persona;
        self.persist(|prefs| prefs.persona = persona);
        self.reset_inner()
    }

    /// Stage a file for the next outbound message (replacing any previous
    /// staging). Validation rejects oversized and unsupported files before
    /// they can reach the transcript or the remote call.
    pub fn stage_attachment(&self, input: FileInput) -> Result<(), AppError> {
        if self.busy.load(Ordering::SeqCst) {
            return Err(AppError::ConcurrentStream(
                "attachment staging rejected while a generation is active".into(),
            ));
        }
        let staged = PendingAttachment::stage(input)?;
        *self.pending.lock().unwrap() = Some(staged);
        Ok(())
    }

    pub fn clear_attachment(&self) {
        self.pending.lock().unwrap().take();
    }

    /// Toggle speech output, persist the choice, and post a notice.
    pub fn set_speak_responses(&self, enabled: bool) {
        self.speech.set_enabled(enabled);
        self.persist(|prefs| prefs.speak_responses = enabled);

        let notice = format!(
            "Speech synthesis {}.",
            if enabled { "enabled" } else { "disabled" }
        );
        if let Err(e) = self.store.lock().unwrap().append(Message::notice(notice)) {
            tracing::error!(%e, "could not post speech toggle notice");
        }
    }

    pub fn set_theme(&self, theme: Theme) {
        self.persist(|prefs| prefs.theme = theme);
    }

    pub fn set_web_search(&self, enabled: bool) {
        self.web_search.store(enabled, Ordering::SeqCst);
    }

    /// Force-fail the in-flight generation, if any. Fragments arriving after
    /// this point are discarded.
    pub fn abort(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    fn persist(&self, update: impl FnOnce(&mut Preferences)) {
        let mut prefs = self.prefs.lock().unwrap();
        update(&mut prefs);
        if let Err(e) = self.prefs_store.save(&prefs) {
            tracing::warn!(%e, "could not persist preferences");
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn store(&self) -> Arc<Mutex<TranscriptStore>> {
        self.store.clone()
    }

    pub fn view(&self) -> TranscriptView {
        self.view.clone()
    }

    pub fn persona(&self) -> Persona {
        *self.persona.lock().unwrap()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn pending_attachment(&self) -> Option<PendingAttachment> {
        self.pending.lock().unwrap().clone()
    }

    pub fn preferences(&self) -> Preferences {
        *self.prefs.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gemini::{GenerationChunk, GenerationStream};
    use crate::engine::speech::NullSpeech;
    use crate::models::Role;
    use async_trait::async_trait;

    struct EchoBackend;

    #[async_trait]
    impl GenerationBackend for EchoBackend {
        async fn stream_generate(
            &self,
            _request: GenerateRequest,
        ) -> Result<GenerationStream, AppError> {
            Ok(Box::pin(futures_util::stream::iter(vec![Ok(
                GenerationChunk {
                    text: Some("ok".into()),
                    citations: Vec::new(),
                },
            )])))
        }
    }

    fn controller() -> SessionController {
        SessionController::new(
            Arc::new(EchoBackend),
            Arc::new(NullSpeech),
            PreferencesStore::ephemeral(),
        )
    }

    #[test]
    fn test_construction_posts_greeting() {
        let session = controller();
        let store = session.store();
        let store = store.lock().unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.messages()[0].role, Role::SystemNotice);
        assert!(store.messages()[0].text().contains("Grim AI"));
    }

    #[tokio::test]
    async fn test_send_empty_input_is_noop() {
        let session = controller();
        session.send("   ").await.unwrap();
        assert_eq!(session.store().lock().unwrap().len(), 1);
        assert!(!session.is_busy());
    }

    #[test]
    fn test_stage_and_clear_attachment() {
        let session = controller();
        session
            .stage_attachment(FileInput {
                name: "notes.txt".into(),
                mime: "text/plain".into(),
                size: 12,
                base64_data: None,
                text_data: Some("hello".into()),
            })
            .unwrap();
        assert!(session.pending_attachment().is_some());
        session.clear_attachment();
        assert!(session.pending_attachment().is_none());
    }

    #[test]
    fn test_stage_oversized_rejected() {
        let session = controller();
        let err = session
            .stage_attachment(FileInput {
                name: "big.png".into(),
                mime: "image/png".into(),
                size: 12 * 1024 * 1024,
                base64_data: Some("aGVsbG8=".into()),
                text_data: None,
            })
            .unwrap_err();
        assert!(matches!(err, AppError::AttachmentTooLarge(_)));
        assert!(session.pending_attachment().is_none());
    }

    #[test]
    fn test_speech_toggle_posts_notice_and_persists() {
        let session = controller();
        session.set_speak_responses(true);
        assert!(session.preferences().speak_responses);

        let store = session.store();
        let store = store.lock().unwrap();
        let last = store.messages().last().unwrap();
        assert_eq!(last.role, Role::SystemNotice);
        assert_eq!(last.text(), "Speech synthesis enabled.");
    }

    #[test]
    fn test_set_theme_persists() {
        let session = controller();
        session.set_theme(Theme::Dark);
        assert_eq!(session.preferences().theme, Theme::Dark);
    }

    #[test]
    fn test_set_persona_resets_with_new_notice() {
        let session = controller();
        session.set_persona(Persona::Analytical).unwrap();
        assert_eq!(session.persona(), Persona::Analytical);

        let store = session.store();
        let store = store.lock().unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.messages()[0].text().contains("analysis"));
    }

    #[tokio::test]
    async fn test_send_appends_user_and_reply() {
        let session = controller();
        session.send("hello").await.unwrap();

        let store = session.store();
        let store = store.lock().unwrap();
        // greeting + user + assistant
        assert_eq!(store.len(), 3);
        assert_eq!(store.messages()[1].role, Role::User);
        assert_eq!(store.messages()[2].text(), "ok");
        assert!(!session.is_busy());
    }
}
