pub mod gateway;

pub use gateway::{LlmClient, LlmConfig, LlmMessage};
