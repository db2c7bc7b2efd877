pub mod error;
pub mod gemini;
pub mod openai;
pub mod redis;
