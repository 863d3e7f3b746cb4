//! ec2-autorestore - point-in-time backup and restore of EC2 root volumes
//!
//! This crate snapshots the root volumes of tagged instance fleets, swaps
//! those volumes back in from the snapshots later, and prunes the backup
//! sets it created. All durable state lives in EC2 tags.

pub mod aws;
pub mod confirm;
pub mod defaults;
pub mod model;
pub mod orchestrator;
pub mod testing;
pub mod wait;
