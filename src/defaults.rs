//! Default operational values shared across workflows
//!
//! These constants keep the wait bounds and poll cadence consistent across
//! the backup, restore, and prune workflows.

use std::time::Duration;

/// Default bound on every state-transition wait (instances stopped, volumes
/// available/in-use): 5 minutes.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Delay before the first state poll.
pub const DEFAULT_POLL_INITIAL_DELAY: Duration = Duration::from_secs(2);

/// Cap on the exponentially growing poll delay.
pub const DEFAULT_POLL_MAX_DELAY: Duration = Duration::from_secs(15);
