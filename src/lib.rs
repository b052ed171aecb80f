pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod markup;
pub mod models;
pub mod prefs;
pub mod render;
pub mod session;
pub mod transcript;

pub use config::GeminiConfig;
pub use engine::{
    GeminiClient, GenerationBackend, GenerationChunk, GenerationStream, NullSpeech,
    SpeechDispatcher, SpeechSynthesizer,
};
pub use error::AppError;
pub use models::{
    AttachmentRef, Citation, FileInput, Message, MessageStatus, PendingAttachment, Persona, Role,
};
pub use prefs::{Preferences, PreferencesStore, Theme};
pub use render::{Bubble, TranscriptView};
pub use session::SessionController;
pub use transcript::{TranscriptEvent, TranscriptStore};
