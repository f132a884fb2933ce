pub mod archive;
pub mod codec;
pub mod config;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod processor;
pub mod store;
