//! A runtime for executing versioned policy rules across local, remote, job,
//! function, and graph execution modes.
//!

pub use praetor_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use praetor_internal::prelude::*;
}
