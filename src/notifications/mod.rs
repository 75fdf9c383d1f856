//! Completion notifications
//!
//! Ad-hoc and sweep runs publish a one-line tally to a channel derived from
//! the owner's address. Delivery is best-effort: a failed publish is logged
//! and never fails the run.

mod centrifugo;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use md5::{Digest, Md5};

use crate::config::NotifierConfig;
use crate::errors::SwapResult;
use crate::logger::{self, LogTag};

pub use centrifugo::CentrifugoNotifier;

/// A message addressed to one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: String,
    pub message: String,
}

impl Notification {
    pub fn for_owner(owner: &str, channel_suffix: &str, message: &str) -> Self {
        Self {
            channel: owner_channel(owner, channel_suffix),
            message: message.to_string(),
        }
    }
}

/// Lowercase hex MD5 of `lowercase(owner) + suffix`
pub fn owner_channel(owner: &str, channel_suffix: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(owner.to_lowercase().as_bytes());
    hasher.update(channel_suffix.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, notification: &Notification) -> SwapResult<()>;
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, notification: &Notification) -> SwapResult<()> {
        logger::info(
            LogTag::Notify,
            &format!("[{}] {}", notification.channel, notification.message),
        );
        Ok(())
    }
}

/// Picks the transport from configuration
pub fn notifier_from_config(config: &NotifierConfig) -> SwapResult<Box<dyn Notifier>> {
    if config.enabled && !config.url.trim().is_empty() {
        Ok(Box::new(CentrifugoNotifier::new(config)?))
    } else {
        Ok(Box::new(LogNotifier))
    }
}
