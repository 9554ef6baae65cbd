//! Persistence Adapters - JSONL-based File Storage
//!
//! Implements the wallet port as an append-only JSONL outbox: every
//! envelope handed to the wallet lands in `outbox/<date>.jsonl` for an
//! external signer to pick up.

pub mod outbox;

pub use outbox::JsonlOutbox;
