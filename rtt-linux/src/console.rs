//! Status sink that writes each line to the log.

use rtt_core::{StatusLine, StatusSink};
use tracing::info;

pub struct LogSink;

impl StatusSink for LogSink {
    fn report(&self, line: StatusLine, text: &str) {
        if text.is_empty() {
            return;
        }
        match line {
            StatusLine::Status => info!(target: "wifirtt::status", "{}", text),
            StatusLine::PeerInfo => info!(target: "wifirtt::peer", "{}", text),
            StatusLine::RangingResult => info!(target: "wifirtt::rtt", "{}", text),
        }
    }
}
