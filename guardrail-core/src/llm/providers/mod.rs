//! Chat client implementations

mod openai;

pub use openai::OpenAiCompatibleClient;
