//! Expose remote HTTP APIs as events on a real-time transport.
//!

pub use hazel_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use hazel_internal::prelude::*;
}
