//! Error type shared by the package, API and orchestration layers.
//!
//! The CLI wraps these in `anyhow` with context; nothing below it recovers
//! from an error except the polling loop's "keep waiting" outcome.

use std::path::PathBuf;
use thiserror::Error;

pub type DeployResult<T> = Result<T, DeployError>;

#[derive(Error, Debug)]
pub enum DeployError {
    #[error("cannot read package descriptor {path}: {source}")]
    DescriptorRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The package archive itself is missing or unreadable.
    #[error("cannot read package {path}: {source}")]
    PackageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Descriptor is unparseable or fails validation.
    #[error("invalid package metadata in {path}: {message}")]
    Metadata { path: PathBuf, message: String },

    /// The request never got a response.
    #[error("{method} request failed")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with an error or an unusable body.
    #[error("{method} failed ({code}): {message}")]
    RemoteApi {
        method: &'static str,
        code: String,
        message: String,
    },

    /// The server reports the deployment itself as failed.
    #[error(
        "Got error '{status}' during deployment of application {app_id}.\nThe following error message is reported from the server:\n{message}"
    )]
    Deployment {
        app_id: String,
        status: String,
        message: String,
    },

    #[error(
        "Previous version is still being deployed (application {app_id} is '{status}'). Use the --wait flag if you want to wait"
    )]
    SafeModeConflict { app_id: String, status: String },

    #[error("application {app_id} did not reach a final status within {waited} (last status '{last_status}')")]
    WaitTimeout {
        app_id: String,
        waited: humantime::Duration,
        last_status: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(String),
}
