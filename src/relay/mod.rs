//! Relay handler
//!
//! Turns one inbound chat message into at most one uploaded video:
//! find the link, check credentials, download through the pool, upload,
//! and report. The scratch guard removes the download on every path.

/// Cookie jar selection
pub mod credentials;
/// URL detection
pub mod url;

pub use credentials::CredentialPolicy;

use crate::bot::transport::{ChatTransport, VideoUpload};
use crate::bot::views::{DefaultRelayView, RelayView};
use crate::downloader::{DownloadRequest, ExtractError, ExtractionPool, PoolError};
use crate::scratch::Scratch;
use crate::utils::html_caption;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Transport-neutral view of an inbound message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IncomingMessage {
    /// Originating chat
    pub chat_id: i64,
    /// Message id, used for replies
    pub message_id: i32,
    /// Text or caption
    pub text: String,
    /// Links taken from message entities, in message order
    pub links: Vec<String>,
}

/// Why a message did not end in an upload
#[derive(Error, Debug)]
pub enum RelayError {
    /// The message carries no link; not reported to anyone
    #[error("no URL in message")]
    NoUrl,
    /// The source needs a cookie jar that is not configured
    #[error("cookies required for {domain}")]
    MissingCredentials {
        /// Domain that requires cookies
        domain: String,
    },
    /// The extractor failed or the file is too large
    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractError),
    /// The chat platform rejected the upload
    #[error("upload failed: {0}")]
    Upload(String),
    /// Anything else, panics included
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PoolError> for RelayError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Extract(e) => Self::Extraction(e),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// A completed relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    /// Link that was fetched
    pub url: String,
    /// Title used for the caption
    pub title: String,
    /// Size of the uploaded file in bytes
    pub size: u64,
}

/// Result of handling one message
#[derive(Debug)]
pub enum Outcome {
    /// No link found, nothing was sent
    Ignored,
    /// The video was uploaded
    Delivered(Delivered),
    /// Handling stopped; the user has been told
    Failed(RelayError),
}

/// Progress message replying to the user's link.
struct StatusMessage {
    transport: Arc<dyn ChatTransport>,
    chat_id: i64,
    reply_to: i32,
    id: Option<i32>,
}

impl StatusMessage {
    fn new(transport: Arc<dyn ChatTransport>, chat_id: i64, reply_to: i32) -> Self {
        Self {
            transport,
            chat_id,
            reply_to,
            id: None,
        }
    }

    /// Edits the status message, or sends it as a reply if there is none yet.
    async fn show(&mut self, text: &str) {
        if let Some(id) = self.id {
            if let Err(e) = self.transport.edit_text(self.chat_id, id, text).await {
                warn!(chat_id = self.chat_id, error = %e, "Failed to edit status message");
            }
            return;
        }
        match self
            .transport
            .send_text(self.chat_id, Some(self.reply_to), text)
            .await
        {
            Ok(id) => self.id = Some(id),
            Err(e) => warn!(chat_id = self.chat_id, error = %e, "Failed to send status message"),
        }
    }

    async fn clear(&mut self) {
        if let Some(id) = self.id.take() {
            if let Err(e) = self.transport.delete(self.chat_id, id).await {
                warn!(chat_id = self.chat_id, error = %e, "Failed to delete status message");
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

/// Per-message orchestrator shared by all handler tasks
pub struct Relay {
    transport: Arc<dyn ChatTransport>,
    pool: ExtractionPool,
    scratch: Scratch,
    credentials: CredentialPolicy,
    max_file_size: u64,
}

impl Relay {
    /// Create a relay uploading files up to `max_file_size` bytes
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        pool: ExtractionPool,
        scratch: Scratch,
        credentials: CredentialPolicy,
        max_file_size: u64,
    ) -> Self {
        Self {
            transport,
            pool,
            scratch,
            credentials,
            max_file_size,
        }
    }

    /// Handles one message end to end. Never panics and never returns an
    /// error: failures are reported to the chat and returned as
    /// [`Outcome::Failed`].
    pub async fn handle(&self, msg: &IncomingMessage) -> Outcome {
        let mut status = StatusMessage::new(self.transport.clone(), msg.chat_id, msg.message_id);

        let result = AssertUnwindSafe(self.process(msg, &mut status))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(RelayError::Internal(panic_message(panic.as_ref()))));

        match result {
            Ok(delivered) => {
                info!(
                    chat_id = msg.chat_id,
                    url = %delivered.url,
                    size = delivered.size,
                    "Video delivered"
                );
                Outcome::Delivered(delivered)
            }
            Err(RelayError::NoUrl) => Outcome::Ignored,
            Err(err) => {
                self.report(msg, &mut status, &err).await;
                Outcome::Failed(err)
            }
        }
    }

    /// Runs the lifecycle for one message.
    ///
    /// The scratch slot is allocated here and dropped on return, which
    /// deletes the download whichever way this function exits.
    async fn process(
        &self,
        msg: &IncomingMessage,
        status: &mut StatusMessage,
    ) -> Result<Delivered, RelayError> {
        let url = url::find_url(&msg.text, &msg.links).ok_or(RelayError::NoUrl)?;
        let cookies = self.credentials.resolve(&url)?;
        info!(chat_id = msg.chat_id, url = %url, "Link received");

        status.show(DefaultRelayView::downloading()).await;

        let slot = self.scratch.allocate();
        let request = DownloadRequest::new(url.clone()).with_cookies(cookies);
        let download = self.pool.fetch(request, slot.target()).await?;

        if !slot.owns(&download.path) {
            return Err(RelayError::Internal(format!(
                "extractor reported a file outside its scratch slot: {}",
                download.path.display()
            )));
        }
        if download.size > self.max_file_size {
            return Err(ExtractError::TooLarge {
                size: download.size,
                limit: self.max_file_size,
            }
            .into());
        }

        status.show(DefaultRelayView::uploading()).await;

        self.transport
            .send_video(VideoUpload {
                chat_id: msg.chat_id,
                reply_to: msg.message_id,
                path: download.path.clone(),
                caption: html_caption(&download.title),
            })
            .await
            .map_err(|e| RelayError::Upload(e.to_string()))?;

        status.clear().await;

        Ok(Delivered {
            url,
            title: download.title,
            size: download.size,
        })
    }

    async fn report(&self, msg: &IncomingMessage, status: &mut StatusMessage, err: &RelayError) {
        match err {
            RelayError::NoUrl => {}
            RelayError::MissingCredentials { domain } => {
                info!(chat_id = msg.chat_id, domain = %domain, "Refusing link without cookie jar");
                status
                    .show(&DefaultRelayView::missing_credentials(domain))
                    .await;
            }
            RelayError::Extraction(e) => {
                warn!(chat_id = msg.chat_id, error = %e, "Extraction failed");
                status
                    .show(&DefaultRelayView::extraction_failed(&e.user_message()))
                    .await;
            }
            RelayError::Upload(e) => {
                error!(chat_id = msg.chat_id, error = %e, "Upload failed");
                status.clear().await;
                if let Err(send_err) = self
                    .transport
                    .send_text(
                        msg.chat_id,
                        Some(msg.message_id),
                        &DefaultRelayView::upload_failed(e),
                    )
                    .await
                {
                    warn!(chat_id = msg.chat_id, error = %send_err, "Failed to report upload error");
                }
            }
            RelayError::Internal(e) => {
                error!(chat_id = msg.chat_id, error = %e, "Relay failed");
                status.show(DefaultRelayView::internal_error()).await;
            }
        }
    }
}
