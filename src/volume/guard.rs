//! Per-owner run guard
//!
//! `try_acquire` hands out an [`OwnerLease`] only when the store's atomic
//! compare-and-set succeeds. The lease must be consumed with
//! [`OwnerLease::release`]. A lease dropped without a successful release
//! (panic, aborted task, store error) schedules a background release with
//! the generic error summary so the owner is never left blocked.
//!
//! Each lease carries the run token minted by the acquire. A lease whose
//! token no longer matches the row reads as cancelled and cannot release,
//! so a cancelled run never clears the flag of the run that replaced it.

use std::sync::Arc;

use crate::errors::SwapResult;
use crate::logger::{self, LogTag};
use crate::store::ProcessStateStore;

use super::types::ERROR_SUMMARY;

#[derive(Clone)]
pub struct OwnerGuard {
    store: Arc<dyn ProcessStateStore>,
}

impl OwnerGuard {
    pub fn new(store: Arc<dyn ProcessStateStore>) -> Self {
        Self { store }
    }

    /// `None` means a run is already active for this owner
    pub async fn try_acquire(&self, owner: &str) -> SwapResult<Option<OwnerLease>> {
        if let Some(run_token) = self.store.try_acquire(owner).await? {
            logger::debug(LogTag::Guard, &format!("Acquired run guard for {}", owner));
            Ok(Some(OwnerLease {
                owner: owner.to_string(),
                run_token,
                store: Some(self.store.clone()),
            }))
        } else {
            logger::debug(
                LogTag::Guard,
                &format!("Run already active for {}", owner),
            );
            Ok(None)
        }
    }

    /// Safe to call whether or not a run is active
    pub async fn request_cancel(&self, owner: &str) -> SwapResult<()> {
        self.store.request_cancel(owner).await?;
        logger::info(LogTag::Guard, &format!("Cancel requested for {}", owner));
        Ok(())
    }
}

/// Proof that the holder owns the active run for `owner`
pub struct OwnerLease {
    owner: String,
    run_token: String,
    store: Option<Arc<dyn ProcessStateStore>>,
}

impl OwnerLease {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub async fn is_cancelled(&self) -> SwapResult<bool> {
        match &self.store {
            Some(store) => store.is_cancelled(&self.owner, &self.run_token).await,
            None => Ok(true),
        }
    }

    /// Marks the owner inactive with `summary`
    pub async fn release(mut self, summary: &str) -> SwapResult<()> {
        let Some(store) = self.store.clone() else {
            return Ok(());
        };
        let released = store.release_run(&self.owner, &self.run_token, summary).await?;
        self.store = None;
        if released {
            logger::debug(
                LogTag::Guard,
                &format!("Released run guard for {}: {}", self.owner, summary),
            );
        } else {
            logger::warning(
                LogTag::Guard,
                &format!(
                    "Run guard for {} was taken over by a newer run, summary dropped: {}",
                    self.owner, summary
                ),
            );
        }
        Ok(())
    }
}

impl Drop for OwnerLease {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        let owner = std::mem::take(&mut self.owner);
        let run_token = std::mem::take(&mut self.run_token);
        logger::warning(
            LogTag::Guard,
            &format!("Run guard for {} dropped without release", owner),
        );

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.release_run(&owner, &run_token, ERROR_SUMMARY).await {
                        logger::error(
                            LogTag::Guard,
                            &format!("Failed to release run guard for {}: {}", owner, e),
                        );
                    }
                });
            }
            Err(_) => {
                logger::error(
                    LogTag::Guard,
                    &format!("No runtime to release run guard for {}", owner),
                );
            }
        }
    }
}
