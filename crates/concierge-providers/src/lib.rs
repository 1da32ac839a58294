pub mod anthropic;
pub mod anthropic_stream;
pub mod embedding;
pub mod provider;
pub mod stream;
