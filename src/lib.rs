pub mod config;
pub mod error;
pub mod geometry;
pub mod layout;
#[cfg(target_os = "macos")]
pub mod macos;
pub mod raise;
pub mod supervisor;

pub use config::Config;
pub use error::LaunchError;
pub use geometry::{GeometryStrategy, ScreenGeometry};
pub use layout::{InstancePlacement, LaunchPlan};
pub use supervisor::{ClientCommand, RunReport, Supervisor, Timing};

pub type Result<T> = anyhow::Result<T>;
