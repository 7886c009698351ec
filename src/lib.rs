#![deny(missing_docs)]
//! clip-relay
//!
//! A Telegram bot that downloads the video behind a posted link with
//! yt-dlp and uploads it back into the chat.

/// Telegram bot implementation
pub mod bot;
/// Configuration management
pub mod config;
/// Media extraction via yt-dlp
pub mod downloader;
/// Per-message relay lifecycle
pub mod relay;
/// Scratch storage for in-flight downloads
pub mod scratch;
/// Utility functions
pub mod utils;
