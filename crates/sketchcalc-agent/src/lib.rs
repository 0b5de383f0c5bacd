pub mod gemini;
pub mod ollama;

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
