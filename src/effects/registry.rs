use tracing::info;

/// Known image-capable Gemini models and their short aliases
///
/// Resolution is a pure lookup; the chosen identifier is handed to the
/// capability explicitly.
pub struct ModelRegistry;

impl ModelRegistry {
    /// Fast, cheap image model
    pub const NANO_BANANA: &'static str = "gemini-2.5-flash-image";

    /// Highest fidelity image model
    pub const NANO_BANANA_PRO: &'static str = "gemini-3-pro-image-preview";

    /// Model for complex instructions and high fidelity
    pub fn best_model() -> &'static str {
        Self::NANO_BANANA_PRO
    }

    /// Model for high volume, low latency work
    pub fn efficient_model() -> &'static str {
        Self::NANO_BANANA
    }

    /// Resolve a user supplied alias to a model identifier
    ///
    /// Unknown names are returned as-is so any model identifier can be used.
    pub fn resolve(choice: &str) -> String {
        let normalized = choice.trim().to_lowercase().replace(' ', "_");
        let resolved = match normalized.as_str() {
            "nano_banana" | "flash" | "efficient" => Self::efficient_model().to_string(),
            "nano_banana_pro" | "pro" | "best" => Self::best_model().to_string(),
            _ => choice.trim().to_string(),
        };
        info!("Selected model: {} (from '{}')", resolved, choice);
        resolved
    }
}
