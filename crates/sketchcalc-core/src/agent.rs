use anyhow::Result;
use async_trait::async_trait;

use crate::types::Image;

/// A multimodal model that answers a text prompt about an image.
///
/// Implementations own transport concerns (auth, timeouts, retries). An `Err`
/// means the call itself failed; a reply that is empty or nonsense is still
/// `Ok` and is dealt with by the normalizer.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Short identifier used in logs, e.g. `gemini`.
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, image: &Image) -> Result<String>;
}
