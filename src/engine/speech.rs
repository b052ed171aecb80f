use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

/// Seam to the host's text-to-speech facility. One utterance per call;
/// implementations must stop speaking when `cancel` fires (a newer utterance
/// has taken over).
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn speak(&self, text: String, cancel: CancellationToken);
}

/// Synthesizer that discards everything. Used when the host has no speech
/// output.
pub struct NullSpeech;

#[async_trait]
impl SpeechSynthesizer for NullSpeech {
    async fn speak(&self, _text: String, _cancel: CancellationToken) {}
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[\s\S]*?```").unwrap())
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"https?://\S+").unwrap())
}

/// Replace code blocks and URLs with spoken placeholders so the utterance
/// stays listenable.
pub fn prepare_spoken_text(text: &str) -> String {
    let cleaned = fence_re().replace_all(text, "Code block displayed.");
    url_re()
        .replace_all(&cleaned, "Link displayed.")
        .into_owned()
}

/// Fire-and-forget speech dispatch with last-one-wins semantics: a new
/// utterance cancels whatever is currently playing; nothing is ever queued.
#[derive(Clone)]
pub struct SpeechDispatcher {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    enabled: Arc<AtomicBool>,
    current: Arc<Mutex<CancellationToken>>,
}

impl SpeechDispatcher {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, enabled: bool) -> Self {
        Self {
            synthesizer,
            enabled: Arc::new(AtomicBool::new(enabled)),
            current: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Speak `text` (after placeholder cleanup), interrupting any in-progress
    /// utterance. No-op when disabled or when the text is empty.
    pub fn speak(&self, text: &str) {
        if !self.is_enabled() || text.trim().is_empty() {
            return;
        }
        let cleaned = prepare_spoken_text(text);

        let token = {
            let mut current = self.current.lock().unwrap();
            current.cancel();
            *current = CancellationToken::new();
            current.clone()
        };

        let synthesizer = self.synthesizer.clone();
        tokio::spawn(async move {
            synthesizer.speak(cleaned, token).await;
        });
    }
}
