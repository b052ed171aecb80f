pub mod gemini;
pub mod speech;
pub mod stream;

pub use gemini::{
    Content, GenerateRequest, GenerationBackend, GenerationChunk, GenerationStream, GeminiClient,
    Part,
};
pub use speech::{NullSpeech, SpeechDispatcher, SpeechSynthesizer};
pub use stream::{StreamConsumer, StreamPhase, SPOKEN_APOLOGY};
