//! Serial device backends.
//!
//! | Backend               | Used by            |
//! |-----------------------|--------------------|
//! | `SystemSerialBackend` | the `uart-server` binary |
//! | `MockSerialBackend`   | unit and integration tests |

pub mod mock;
pub mod system;

pub use mock::MockSerialBackend;
pub use system::SystemSerialBackend;
