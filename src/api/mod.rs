//! Management Web API access.
//!
//! The orchestrator only sees [`ServerApi`]; [`ZendClient`] is the HTTP
//! implementation and tests substitute in-memory fakes.

mod signature;
mod wire;
mod zend;

use crate::error::DeployResult;
use crate::model::{ApplicationRecord, DeploymentRequest, LibraryRecord, UpdateRequest};
use std::path::Path;

pub(crate) use zend::ZendClient;

pub(crate) trait ServerApi {
    /// List applications; an empty `app_ids` lists all of them.
    async fn application_get_status(&self, app_ids: &[String]) -> DeployResult<Vec<ApplicationRecord>>;

    async fn application_deploy(&self, request: &DeploymentRequest) -> DeployResult<ApplicationRecord>;

    async fn application_update(&self, request: &UpdateRequest) -> DeployResult<ApplicationRecord>;

    async fn library_version_deploy(&self, package: &Path) -> DeployResult<LibraryRecord>;
}
