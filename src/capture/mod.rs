//! Speech capture
//!
//! Platform recognizers sit behind `SpeechCapture`; `CaptureBridge` turns a
//! recognizer into a single awaited transcript and forwards it to a session.

mod backend;
mod bridge;

pub use backend::{CaptureEvent, CaptureFeed, ChannelCapture, SpeechCapture, UnavailableCapture};
pub use bridge::CaptureBridge;
