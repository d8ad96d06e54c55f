//! Domain layer: pure state with no I/O.
//!
//! - **`mode`** – The text/binary interpretation switch for inbound bytes,
//!   driven by sentinel commands typed by the operator.
//! - **`drop_policy`** – The named drop-on-full policy used wherever a write
//!   would block, plus the counters that make dropped data observable.

pub mod drop_policy;
pub mod mode;

pub use drop_policy::{Delivery, DropCounter, DropOnFull};
pub use mode::{ModeController, ModeTransition, SentinelCommands, StreamMode};
