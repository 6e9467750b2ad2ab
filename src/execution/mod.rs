//! External process execution layer.
//!
//! Every external collaborator (full-dataset reduction, per-partition
//! reduction, merge utility, event-count query) is launched through the
//! [`ProcessLauncher`] trait from a typed [`CommandSpec`]. Arguments are passed
//! as an argv vector, never through a shell.
//!
//! # Example
//!
//! ```ignore
//! use event_stager::execution::{CommandSpec, ProcessLauncher, SystemLauncher};
//!
//! let launcher = SystemLauncher::new();
//! let spec = CommandSpec::new("hadd").with_args(["-f", "out.root", "a.root", "b.root"]);
//! let output = launcher.launch(&spec).await?;
//! assert!(output.is_success());
//! ```

pub mod process;

pub use process::{CommandSpec, LaunchError, ProcessLauncher, ProcessOutput, SystemLauncher};
