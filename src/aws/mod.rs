//! AWS integration layer
//!
//! Shared configuration loading, the EC2 client and its operations trait,
//! error classification, and the tagging scheme that correlates backup
//! resources.

pub mod context;
pub mod ec2;
pub mod error;
pub mod tags;

pub use context::AwsContext;
pub use ec2::{Ec2Client, Ec2Operations};
