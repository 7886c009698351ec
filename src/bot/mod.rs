/// Command and message handlers
pub mod handlers;
/// Chat operations behind a trait
pub mod transport;
/// User-facing texts
pub mod views;

pub use transport::{ChatTransport, TelegramTransport, VideoUpload};
