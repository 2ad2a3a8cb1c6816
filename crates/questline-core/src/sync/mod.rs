//! Write-through to the progress store.
//!
//! Engine steps never touch the store directly. They enqueue typed writes
//! in a durable [`Outbox`], which is flushed on demand or by [`run_flusher`].

pub mod flusher;
pub mod outbox;

pub use flusher::run_flusher;
pub use outbox::{FlushReport, Outbox, OutboxWrite, PendingWrite, RetryPolicy};
