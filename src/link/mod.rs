//! # Device Link Module
//!
//! Request/reply text link to a flight computer or ground receiver.
//!
//! This module handles:
//! - Sending commands and reading line replies with a per-reply timeout
//! - Entering and leaving remote (radio relayed) mode
//! - The `a` ADC query shared by every sensor reader
//! - Opening a serial port as a link

pub mod serial;

pub use serial::SerialLink;

use async_trait::async_trait;

use crate::error::{AltosError, Result};

/// Reply timeout used when a link is not configured otherwise
pub const DEFAULT_REPLY_TIMEOUT_MS: u64 = 5000;

/// Command that starts a remote (packet mode) session
pub const START_REMOTE_COMMAND: &str = "p\nE 0\n";

/// Byte that ends a remote session
pub const STOP_REMOTE_COMMAND: &str = "~";

/// Line prefix of the ADC reply
pub const ADC_REPLY_PREFIX: &str = "tick:";

/// Request/reply device link
///
/// Replies are single lines without the trailing newline. `None` from
/// [`Link::get_reply_no_dialog`] means nothing arrived in time.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Link: Send {
    /// Send raw command text
    async fn printf(&mut self, text: &str) -> Result<()>;

    /// Read one reply line, or `None` on timeout or end of stream
    async fn get_reply_no_dialog(&mut self, timeout_ms: u64) -> Result<Option<String>>;

    /// Push any buffered command text to the device
    async fn flush_output(&mut self) -> Result<()>;

    async fn start_remote(&mut self) -> Result<()>;

    async fn stop_remote(&mut self) -> Result<()>;

    /// True while a remote session is open
    fn is_remote(&self) -> bool;

    fn reply_timeout_ms(&self) -> u64 {
        DEFAULT_REPLY_TIMEOUT_MS
    }

    /// Query the ADC and return the whitespace-split reply
    ///
    /// Lines before the `tick:` line (echo, banners) are discarded.
    async fn adc(&mut self) -> Result<Vec<String>> {
        self.printf("a\n").await?;
        self.flush_output().await?;

        let timeout_ms = self.reply_timeout_ms();
        loop {
            let line = self
                .get_reply_no_dialog(timeout_ms)
                .await?
                .ok_or_else(|| AltosError::Timeout("ADC reply".to_string()))?;

            if line.trim_start().starts_with(ADC_REPLY_PREFIX) {
                return Ok(line.split_whitespace().map(String::from).collect());
            }
        }
    }
}
