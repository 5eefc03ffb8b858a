pub mod byterange;
pub mod config;
pub mod constants;
pub mod document;
pub mod engine;
pub mod key;
pub mod logging;
pub mod multipart;
pub mod singleflight;
pub mod status;
pub mod store;
