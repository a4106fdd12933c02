pub mod features;
pub mod gemini;

pub use features::{build_prompt, FeatureSnapshot};
pub use gemini::{parse_response, unwrap_fences, GeminiScorer};
