//! Progress Indicator
//!
//! A cosmetic spinner drawn on stderr from a background timer task while a
//! model call is in flight. Carries no data; callers stop it before the
//! first streamed token is rendered.

use std::io::{self, Write};
use std::time::Duration;

use tokio::task::JoinHandle;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_INTERVAL: Duration = Duration::from_millis(120);

/// Handle to a running spinner
pub struct Spinner {
    message_width: usize,
    handle: JoinHandle<()>,
}

impl Spinner {
    /// Start drawing `message` with an animated frame
    pub fn start(message: &str) -> Self {
        let message_width = message.chars().count();
        let message = message.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(FRAME_INTERVAL);
            for frame in FRAMES.iter().cycle() {
                ticker.tick().await;
                eprint!("\r{frame} {message}");
                let _ = io::stderr().flush();
            }
        });
        Self {
            message_width,
            handle,
        }
    }

    /// Stop the spinner and clear its line
    pub fn stop(self) {
        self.handle.abort();
        eprint!("\r{}\r", " ".repeat(self.message_width + 2));
        let _ = io::stderr().flush();
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        // A spinner abandoned mid-call must not keep drawing
        self.handle.abort();
    }
}
