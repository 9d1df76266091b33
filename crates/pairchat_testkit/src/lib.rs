//! # Pairchat Testkit
//!
//! Test utilities for pairchat.
//!
//! This crate provides:
//! - An in-process test server with inspectable stores
//! - Loopback transports and ready-made conversations
//! - Property-based test generators using proptest
//! - Fault injection for stores and transports
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use pairchat_testkit::prelude::*;
//!
//! let server = scenarios::inbox(3);
//! let sync = server.conversation("alice", "bob");
//! sync.open().unwrap();
//! assert_eq!(ids(&sync.messages()), vec![1, 2, 3]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::faults::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
}

pub use faults::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
