//! Bounded extraction pool.
//!
//! Extraction is a blocking child-process call. The pool runs it on tokio's
//! blocking threads behind a semaphore, so the dispatcher keeps serving
//! updates and at most `max_concurrent` downloads hit the disk at once.

use super::{DownloadRequest, DownloadResult, ExtractError, MediaExtractor};
use crate::scratch::ScratchTarget;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error};

/// Errors from running work on the pool
#[derive(Error, Debug)]
pub enum PoolError {
    /// The extractor itself failed
    #[error(transparent)]
    Extract(#[from] ExtractError),
    /// The worker panicked or was cancelled
    #[error("extraction worker failed: {0}")]
    Worker(String),
    /// The pool was shut down
    #[error("extraction pool is closed")]
    Closed,
}

/// Worker pool that offloads blocking extractor calls
#[derive(Clone)]
pub struct ExtractionPool {
    extractor: Arc<dyn MediaExtractor>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ExtractionPool {
    /// Create a pool allowing `max_concurrent` simultaneous extractions
    /// (at least one).
    #[must_use]
    pub fn new(extractor: Arc<dyn MediaExtractor>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            extractor,
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Configured concurrency bound
    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Runs `job` against the extractor on a blocking thread once a permit
    /// is available.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Worker`] if the job panics and
    /// [`PoolError::Closed`] if the pool has been shut down.
    pub async fn run<F, T>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce(&dyn MediaExtractor) -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed)?;
        let extractor = Arc::clone(&self.extractor);

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job(extractor.as_ref())
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Extraction worker did not complete");
            PoolError::Worker(e.to_string())
        })
    }

    /// Downloads `request` into `target` without blocking the caller.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Extract`] with the extractor's error, or a
    /// worker error if the job never completed.
    pub async fn fetch(
        &self,
        request: DownloadRequest,
        target: ScratchTarget,
    ) -> Result<DownloadResult, PoolError> {
        debug!(url = %request.url, stem = %target.stem(), "Queueing extraction");
        Ok(self
            .run(move |extractor| extractor.fetch(&request, &target))
            .await??)
    }

    /// Version of the extraction tool.
    ///
    /// # Errors
    ///
    /// Returns a [`PoolError`] if the tool cannot be queried.
    pub async fn version(&self) -> Result<String, PoolError> {
        Ok(self.run(|extractor| extractor.version()).await??)
    }

    /// Stops handing out permits; queued and future jobs fail with
    /// [`PoolError::Closed`].
    pub fn close(&self) {
        self.permits.close();
    }
}
