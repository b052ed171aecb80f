use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::engine::gemini::{GenerateRequest, GenerationBackend};
use crate::engine::speech::SpeechDispatcher;
use crate::error::AppError;
use crate::models::{Citation, Persona};
use crate::transcript::TranscriptStore;

/// Spoken after any failure, in place of the raw error text.
pub const SPOKEN_APOLOGY: &str = "Sorry, I encountered an error.";

/// Where the consumer currently is in the generation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Failed,
}

/// Drives one generation: pulls chunks off the backend stream, feeds text
/// deltas to the transcript in strict arrival order, retains the final
/// citation set, and dispatches the speech side-effect exactly once on
/// completion or failure.
pub struct StreamConsumer {
    store: Arc<Mutex<TranscriptStore>>,
    speech: SpeechDispatcher,
    idle_timeout: Duration,
    phase: StreamPhase,
}

impl StreamConsumer {
    pub fn new(
        store: Arc<Mutex<TranscriptStore>>,
        speech: SpeechDispatcher,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            store,
            speech,
            idle_timeout,
            phase: StreamPhase::Idle,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    /// Run one generation to a terminal state. Returns the full concatenated
    /// response text on completion. All remote errors are converted into an
    /// errored transcript message before being returned.
    pub async fn run(
        &mut self,
        backend: &dyn GenerationBackend,
        request: GenerateRequest,
        message_id: &str,
        persona: Persona,
        cancel: CancellationToken,
    ) -> Result<String, AppError> {
        self.phase = StreamPhase::Requesting;
        tracing::debug!(message_id, "issuing generation request");

        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.abort(message_id, persona),
            result = backend.stream_generate(request) => match result {
                Ok(stream) => stream,
                Err(e) => return self.fail(message_id, persona, e),
            },
        };

        // The remote accepted the request; chunks may now arrive.
        self.phase = StreamPhase::Streaming;

        let mut citations: Option<Vec<Citation>> = None;
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.abort(message_id, persona),
                item = timeout(self.idle_timeout, stream.next()) => item,
            };

            let item = match item {
                Ok(item) => item,
                Err(_) => {
                    let e = AppError::RemoteCall(format!(
                        "stream produced no data for {}s",
                        self.idle_timeout.as_secs()
                    ));
                    return self.fail(message_id, persona, e);
                }
            };

            match item {
                None => break,
                Some(Ok(chunk)) => {
                    if let Some(text) = chunk.text {
                        let extend_result = self.store.lock().unwrap().extend(message_id, &text);
                        if let Err(e) = extend_result {
                            // Programmer-error class: abort the send rather
                            // than drop fragments silently.
                            return self.fail(message_id, persona, e);
                        }
                    }
                    if !chunk.citations.is_empty() {
                        citations = Some(chunk.citations);
                    }
                }
                Some(Err(e)) => return self.fail(message_id, persona, e),
            }
        }

        let final_text = {
            let mut store = self.store.lock().unwrap();
            let text = store
                .get(message_id)
                .map(|m| m.text())
                .unwrap_or_default();
            if let Err(e) = store.complete(message_id, citations) {
                drop(store);
                return self.fail(message_id, persona, e);
            }
            text
        };

        self.phase = StreamPhase::Completed;
        tracing::debug!(message_id, chars = final_text.len(), "generation complete");
        self.speech.speak(&final_text);
        Ok(final_text)
    }

    /// Terminal failure: mark the message errored with persona-flavored text
    /// and speak a generic apology (never the raw error).
    fn fail(
        &mut self,
        message_id: &str,
        persona: Persona,
        error: AppError,
    ) -> Result<String, AppError> {
        self.phase = StreamPhase::Failed;
        tracing::warn!(message_id, %error, "generation failed");

        let flavored = persona.flavored_error(&error_detail(&error));
        if let Err(store_err) = self.store.lock().unwrap().fail(message_id, &flavored) {
            tracing::error!(message_id, %store_err, "could not mark message errored");
        }
        self.speech.speak(SPOKEN_APOLOGY);
        Err(error)
    }

    /// Forced teardown: transition to failed without speaking. Fragments
    /// arriving after this point are never delivered.
    fn abort(&mut self, message_id: &str, persona: Persona) -> Result<String, AppError> {
        self.phase = StreamPhase::Failed;
        tracing::info!(message_id, "generation aborted");

        let flavored = persona.flavored_error("generation aborted");
        if let Err(store_err) = self.store.lock().unwrap().fail(message_id, &flavored) {
            tracing::error!(message_id, %store_err, "could not mark message aborted");
        }
        Err(AppError::RemoteCall("generation aborted".to_string()))
    }
}

/// Bare detail for persona flavoring, without the variant prefix.
fn error_detail(error: &AppError) -> String {
    match error {
        AppError::RemoteCall(m)
        | AppError::InvalidState(m)
        | AppError::NotFound(m)
        | AppError::ConcurrentStream(m) => m.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gemini::{GenerationChunk, GenerationStream};
    use crate::engine::speech::{NullSpeech, SpeechSynthesizer};
    use crate::models::{Message, MessageStatus};
    use async_trait::async_trait;

    struct ScriptedBackend {
        items: Mutex<Option<Vec<Result<GenerationChunk, AppError>>>>,
    }

    impl ScriptedBackend {
        fn new(items: Vec<Result<GenerationChunk, AppError>>) -> Self {
            Self {
                items: Mutex::new(Some(items)),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn stream_generate(
            &self,
            _request: GenerateRequest,
        ) -> Result<GenerationStream, AppError> {
            let items = self.items.lock().unwrap().take().unwrap_or_default();
            Ok(Box::pin(futures_util::stream::iter(items)))
        }
    }

    struct RejectingBackend;

    #[async_trait]
    impl GenerationBackend for RejectingBackend {
        async fn stream_generate(
            &self,
            _request: GenerateRequest,
        ) -> Result<GenerationStream, AppError> {
            Err(AppError::RemoteCall("service unavailable".into()))
        }
    }

    struct StalledBackend;

    #[async_trait]
    impl GenerationBackend for StalledBackend {
        async fn stream_generate(
            &self,
            _request: GenerateRequest,
        ) -> Result<GenerationStream, AppError> {
            Ok(Box::pin(futures_util::stream::pending()))
        }
    }

    fn text_chunk(text: &str) -> Result<GenerationChunk, AppError> {
        Ok(GenerationChunk {
            text: Some(text.to_string()),
            citations: Vec::new(),
        })
    }

    fn request() -> GenerateRequest {
        GenerateRequest {
            system_instruction: "be brief".into(),
            contents: Vec::new(),
            web_search: false,
        }
    }

    fn setup() -> (Arc<Mutex<TranscriptStore>>, String, StreamConsumer) {
        let store = Arc::new(Mutex::new(TranscriptStore::new()));
        let id = store
            .lock()
            .unwrap()
            .append(Message::streaming_assistant())
            .unwrap();
        let speech = SpeechDispatcher::new(Arc::new(NullSpeech), false);
        let consumer = StreamConsumer::new(store.clone(), speech, Duration::from_secs(5));
        (store, id, consumer)
    }

    #[tokio::test]
    async fn test_fragments_land_in_arrival_order() {
        let (store, id, mut consumer) = setup();
        let backend = ScriptedBackend::new(vec![text_chunk("Hi"), text_chunk(" there!")]);

        let text = consumer
            .run(&backend, request(), &id, Persona::Neutral, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(text, "Hi there!");
        assert_eq!(consumer.phase(), StreamPhase::Completed);
        let store = store.lock().unwrap();
        let msg = store.get(&id).unwrap();
        assert_eq!(msg.status, MessageStatus::Complete);
        assert_eq!(msg.text(), "Hi there!");
        assert!(msg.citations.is_none());
    }

    #[tokio::test]
    async fn test_terminal_chunk_citations_attach() {
        let (store, id, mut consumer) = setup();
        let backend = ScriptedBackend::new(vec![
            text_chunk("grounded"),
            Ok(GenerationChunk {
                text: None,
                citations: vec![Citation {
                    uri: Some("https://example.com".into()),
                    title: Some("Example".into()),
                }],
            }),
        ]);

        consumer
            .run(&backend, request(), &id, Persona::Neutral, CancellationToken::new())
            .await
            .unwrap();

        let store = store.lock().unwrap();
        let citations = store.get(&id).unwrap().citations.as_ref().unwrap();
        assert_eq!(citations.len(), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_error_flavors_message() {
        let (store, id, mut consumer) = setup();
        let backend = ScriptedBackend::new(vec![
            text_chunk("Partial"),
            Err(AppError::RemoteCall("connection reset".into())),
        ]);

        let err = consumer
            .run(&backend, request(), &id, Persona::Adversarial, CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RemoteCall(_)));
        assert_eq!(consumer.phase(), StreamPhase::Failed);
        let store = store.lock().unwrap();
        let msg = store.get(&id).unwrap();
        assert_eq!(msg.status, MessageStatus::Errored);
        // The partial fragment is replaced by the flavored error text.
        assert!(!msg.text().contains("Partial"));
        assert!(msg.text().contains("connection reset"));
        assert!(msg.text().contains("ARE YOU KIDDING ME?!"));
    }

    #[tokio::test]
    async fn test_request_rejection_fails_message() {
        let (store, id, mut consumer) = setup();

        let err = consumer
            .run(
                &RejectingBackend,
                request(),
                &id,
                Persona::Neutral,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RemoteCall(_)));
        let store = store.lock().unwrap();
        assert_eq!(store.get(&id).unwrap().status, MessageStatus::Errored);
    }

    #[tokio::test]
    async fn test_idle_timeout_fails_stream() {
        let (store, id, _) = setup();
        let speech = SpeechDispatcher::new(Arc::new(NullSpeech), false);
        let mut consumer =
            StreamConsumer::new(store.clone(), speech, Duration::from_millis(50));

        let err = consumer
            .run(
                &StalledBackend,
                request(),
                &id,
                Persona::Neutral,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(err.to_string().contains("no data"));
        let store = store.lock().unwrap();
        assert_eq!(store.get(&id).unwrap().status, MessageStatus::Errored);
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_aborts() {
        let (store, id, mut consumer) = setup();
        let backend = ScriptedBackend::new(vec![text_chunk("never delivered")]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = consumer
            .run(&backend, request(), &id, Persona::Neutral, cancel)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("aborted"));
        let store = store.lock().unwrap();
        let msg = store.get(&id).unwrap();
        assert_eq!(msg.status, MessageStatus::Errored);
        assert!(!msg.text().contains("never delivered"));
    }

    struct ApologyRecorder {
        spoken: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for ApologyRecorder {
        async fn speak(&self, text: String, _cancel: CancellationToken) {
            self.spoken.lock().unwrap().push(text);
        }
    }

    #[tokio::test]
    async fn test_failure_speaks_generic_apology() {
        let store = Arc::new(Mutex::new(TranscriptStore::new()));
        let id = store
            .lock()
            .unwrap()
            .append(Message::streaming_assistant())
            .unwrap();
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let speech = SpeechDispatcher::new(
            Arc::new(ApologyRecorder {
                spoken: spoken.clone(),
            }),
            true,
        );
        let mut consumer = StreamConsumer::new(store, speech, Duration::from_secs(5));
        let backend =
            ScriptedBackend::new(vec![Err(AppError::RemoteCall("secret detail".into()))]);

        consumer
            .run(&backend, request(), &id, Persona::Neutral, CancellationToken::new())
            .await
            .unwrap_err();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let spoken = spoken.lock().unwrap();
        assert_eq!(spoken.len(), 1);
        assert_eq!(spoken[0], SPOKEN_APOLOGY);
    }
}
