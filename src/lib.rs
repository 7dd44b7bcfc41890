//! Self-update core for desktop applications.
//!
//! [`UpdateCoordinator`] checks a GitHub-style release registry for a newer
//! build and applies it, either by staging a replacement executable
//! (portable deployments) or by launching the installer (installer
//! deployments). The host decides when to restart.

pub mod auto_update;

pub use auto_update::{
    DeploymentMode, UpdateConfig, UpdateCoordinator, UpdateError, UpdateInfo, UpdateProgress,
    UpdateState, UpdateStatus,
};
