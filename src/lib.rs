//! SMS Relay - a durable webhook sink for an Android SMS gateway device.
//!
//! The gateway device pushes `sms:received` events to this service as signed
//! webhook callbacks. Events are verified, normalized, and written to a local
//! SQLite log with storage-level deduplication, then served back through a
//! small REST API so consumers can poll and acknowledge at their own pace.

pub mod config;
pub mod gateway;
pub mod server;
pub mod store;
pub mod types;
pub mod webhooks;
