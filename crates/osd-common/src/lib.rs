//! Common infrastructure for the appliance OS daemons.
//!
//! - [`shell`]: External command execution behind the [`CommandRunner`] trait
//! - [`error`]: Error types shared by the daemons
//! - [`lifecycle`]: Single-fire shutdown/reboot control events
//! - [`applications`]: Name-keyed registry of application handlers
//!
//! # Example
//!
//! ```ignore
//! use osd_common::{
//!     shell::{CommandRunner, SystemRunner, SYSTEMCTL_CMD},
//!     OsdResult,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! async fn restart(unit: &str, cancel: &CancellationToken) -> OsdResult<()> {
//!     SystemRunner::new()
//!         .run_or_throw(cancel, SYSTEMCTL_CMD, &["restart", unit])
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod applications;
pub mod error;
pub mod lifecycle;
pub mod shell;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used items at crate root
pub use applications::{Application, ApplicationRegistry};
pub use error::{OsdError, OsdResult};
pub use lifecycle::{ControlAction, LifecycleEvents};
pub use shell::{CommandRunner, ExecResult, SystemRunner};

// Re-exported so dependents share one token type with the runner.
pub use tokio_util::sync::CancellationToken;
