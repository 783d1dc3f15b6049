pub mod analysis;
pub mod cache;
pub mod config;
pub mod decoding;
pub mod errors;
pub mod events;
pub mod output;
pub mod playback;
pub mod types;
