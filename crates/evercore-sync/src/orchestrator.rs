//! Per-account orchestration of one full sync cycle (§2, §5).
//!
//! Wires the data flow the specification names at the top of §2:
//! `Orchestrator -> AuthenticationProvider -> NoteStoreProvider ->
//! Downloader -> (local store writes) -> Sender -> (local store reads +
//! NoteStoreProvider uploads) -> SyncStateStore`. The orchestrator itself
//! holds no sync logic: it owns the canceler composition (§5 "Cancellation")
//! and runs [`Downloader::run`] followed by [`Sender::run`], matching the
//! teacher's `lnxdrive-sync::engine::SyncEngine::run_cycle` top-level shape.

use std::sync::Arc;

use evercore_core::error::{CoreError, CoreResult};
use evercore_core::ports::{Canceler, ProgressCallback, TokenCanceler};
use tracing::{error, info};

use crate::downloader::{Downloader, DownloadResult};
use crate::sender::{Sender, SendResult};

/// Combined outcome of a download-then-send cycle.
#[derive(Debug, Clone)]
pub struct CycleResult {
    pub download: DownloadResult,
    pub send: SendResult,
}

/// Drives one account's download pipeline followed by its upload pipeline.
///
/// A fresh `Orchestrator` (or at least a fresh internal canceler) should be
/// used per cycle: the manual canceler latches permanently once a fatal
/// server signal fires, by design (§5), so reusing one across cycles would
/// leave every subsequent cycle pre-cancelled.
pub struct Orchestrator {
    downloader: Downloader,
    sender: Sender,
    manual_canceler: Arc<TokenCanceler>,
}

impl Orchestrator {
    pub fn new(downloader: Downloader, sender: Sender) -> Self {
        Self {
            downloader,
            sender,
            manual_canceler: Arc::new(TokenCanceler::new()),
        }
    }

    /// Runs download then send, propagating a caller-supplied canceler
    /// combined with the orchestrator's own manual canceler (§5's "any-of"
    /// canceler). The manual canceler is never armed directly by the
    /// caller; `Downloader`/`Sender` trigger it internally when they
    /// observe a fatal [`ProtocolError`](evercore_core::error::ProtocolError)
    /// (rate limit or auth expiry), so that remaining in-flight work in
    /// other scopes unwinds promptly.
    #[tracing::instrument(skip(self, caller_canceler, progress))]
    pub async fn run_cycle(
        &self,
        caller_canceler: Arc<dyn Canceler>,
        progress: Arc<dyn ProgressCallback>,
    ) -> CoreResult<CycleResult> {
        let canceler = self.any_of(caller_canceler);

        info!("starting download pipeline");
        let download = match self.downloader.run(canceler.clone(), progress.clone()).await {
            Ok(result) => result,
            Err(e) => {
                self.latch_on_fatal(&e);
                return Err(e);
            }
        };
        info!(
            notebooks = download.user_own.chunk_counters.notebooks.processed_present,
            "download pipeline complete"
        );

        info!("starting send pipeline");
        let send = match self.sender.run(canceler, progress).await {
            Ok(result) => result,
            Err(e) => {
                self.latch_on_fatal(&e);
                return Err(e);
            }
        };
        info!("send pipeline complete");

        Ok(CycleResult { download, send })
    }

    /// An "any-of" canceler: canceled the moment either the caller's
    /// canceler or this orchestrator's internal manual canceler fires.
    fn any_of(&self, caller_canceler: Arc<dyn Canceler>) -> Arc<dyn Canceler> {
        Arc::new(AnyOfCanceler {
            caller: caller_canceler,
            manual: self.manual_canceler.clone(),
        })
    }

    /// Arms the manual canceler when a stage fails with one of the two
    /// fatal server signals, so any concurrently-running scope unwinds at
    /// its next cancellation check (§4.4.4, §7).
    fn latch_on_fatal(&self, err: &CoreError) {
        if err.is_stop_synchronization() {
            error!(error = %err, "fatal server signal observed, arming manual canceler");
            self.manual_canceler.cancel();
        }
    }
}

struct AnyOfCanceler {
    caller: Arc<dyn Canceler>,
    manual: Arc<TokenCanceler>,
}

impl Canceler for AnyOfCanceler {
    fn is_canceled(&self) -> bool {
        self.caller.is_canceled() || self.manual.is_canceled()
    }

    fn cancel(&self) {
        self.manual.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_of_canceler_reflects_either_source() {
        let caller = Arc::new(TokenCanceler::new());
        let manual = Arc::new(TokenCanceler::new());
        let any_of = AnyOfCanceler {
            caller: caller.clone(),
            manual: manual.clone(),
        };
        assert!(!any_of.is_canceled());

        manual.cancel();
        assert!(any_of.is_canceled());
    }
}
