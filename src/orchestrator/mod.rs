//! Install orchestration.
//!
//! Decides between deploying a new application and updating an existing one,
//! applies the safe-mode guard, and waits for deployments to settle. The CLI
//! calls into this module with an API client and a package inspector.

mod install;
mod poller;

pub(crate) use install::{InstallParams, Installer};
