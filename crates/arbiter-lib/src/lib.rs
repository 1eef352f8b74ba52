//! Shared library for the CPU arbitration control plane
//!
//! This crate provides the pieces both the controller and the host
//! agent depend on:
//! - Topology snapshot types
//! - The line-oriented command protocol
//! - The rolling per-app demand window
//! - Cgroup read/write plumbing
//! - The agent-side command session

pub mod cgroup;
pub mod constants;
pub mod models;
pub mod protocol;
pub mod rolling;
pub mod sampler;
pub mod session;

pub use models::{Enforcement, Node, Pod, Topology};
pub use protocol::Command;
pub use session::{Session, SharedWeights};
