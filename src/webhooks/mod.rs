//! Webhook handling for gateway push events.
//!
//! This module provides:
//! - Signature verification for webhook payloads (HMAC-SHA256)
//! - The push envelope model and its normalization into a storable message

pub mod envelope;
pub mod signature;

pub use envelope::{EVENT_SMS_RECEIVED, MessagePayload, NormalizeError, PushEnvelope};
pub use signature::{compute_signature, verify_signature};
