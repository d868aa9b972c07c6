pub mod budget;
pub mod openai;

pub use openai::{ChatCompletionRequest, ImageRequest, LlmClient, OpenAiClient, OpenAiClientConfig};
