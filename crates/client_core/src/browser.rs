//! Outward-facing collaborators the handlers reach for: navigation, alerts,
//! and file downloads.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::transport::Attachment;

pub trait BrowserPort: Send + Sync {
    fn navigate(&self, path: &str);
    fn alert(&self, message: &str);
    fn save_download(&self, attachment: &Attachment);
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrowserCall {
    Navigate(String),
    Alert(String),
    Download(Attachment),
}

/// Logs each call and keeps it in order; the console prints them after a
/// run and tests assert on them.
#[derive(Default)]
pub struct RecordingBrowser {
    calls: Mutex<Vec<BrowserCall>>,
}

impl RecordingBrowser {
    pub fn calls(&self) -> Vec<BrowserCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn navigations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrowserCall::Navigate(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BrowserCall::Alert(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: BrowserCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl BrowserPort for RecordingBrowser {
    fn navigate(&self, path: &str) {
        info!(%path, "browser: navigate");
        self.record(BrowserCall::Navigate(path.to_string()));
    }

    fn alert(&self, message: &str) {
        warn!(%message, "browser: alert");
        self.record(BrowserCall::Alert(message.to_string()));
    }

    fn save_download(&self, attachment: &Attachment) {
        info!(
            filename = %attachment.filename,
            size_bytes = attachment.bytes.len(),
            "browser: download ready"
        );
        self.record(BrowserCall::Download(attachment.clone()));
    }
}
