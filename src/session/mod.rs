//! Session correlation
//!
//! Decides which messages are answered and pairs replies with requests.

pub mod correlator;

pub use correlator::{expected_replies, Correlator, Exchange};
