//! Deploy-or-update decision for a single package.

use super::poller::DeploymentPoller;
use crate::api::ServerApi;
use crate::error::{DeployError, DeployResult};
use crate::model::{
    AppStatus, ApplicationRecord, DeployFlags, DeploymentRequest, InstallOutcome, PackageType,
    PollPolicy, UpdateRequest,
};
use crate::package::PackageInspector;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

/// Parameters of one install invocation.
#[derive(Debug, Clone, Default)]
pub(crate) struct InstallParams {
    pub package: PathBuf,
    pub base_url: Option<String>,
    pub app_name: Option<String>,
    pub user_params: BTreeMap<String, String>,
    pub wait: bool,
    pub safe: bool,
    pub flags: DeployFlags,
}

/// Update of an already deployed application, executed once the installer
/// decided it may proceed.
#[derive(Debug, Clone)]
pub(crate) struct UpdatePlan {
    pub app_id: String,
    pub package: PathBuf,
    pub user_params: BTreeMap<String, String>,
    pub ignore_failures: bool,
}

impl UpdatePlan {
    pub(crate) async fn execute<A: ServerApi>(
        &self,
        api: &A,
        poller: &DeploymentPoller<'_, A>,
        wait: bool,
    ) -> DeployResult<InstallOutcome> {
        let request = UpdateRequest {
            app_id: self.app_id.clone(),
            package: self.package.clone(),
            user_params: self.user_params.clone(),
            ignore_failures: self.ignore_failures,
        };
        let application = api.application_update(&request).await?;
        let poll = if wait {
            Some(poller.wait_deployed(&self.app_id).await?)
        } else {
            None
        };
        Ok(InstallOutcome::Updated { application, poll })
    }
}

pub(crate) struct Installer<'a, A, P> {
    api: &'a A,
    inspector: &'a P,
    policy: PollPolicy,
}

impl<'a, A: ServerApi, P: PackageInspector> Installer<'a, A, P> {
    pub(crate) fn new(api: &'a A, inspector: &'a P, policy: PollPolicy) -> Self {
        Self {
            api,
            inspector,
            policy,
        }
    }

    pub(crate) async fn install(&self, params: &InstallParams) -> DeployResult<InstallOutcome> {
        let meta = self.inspector.meta(&params.package)?;
        if meta.package_type == PackageType::Library {
            info!(package = %params.package.display(), "Package is a library");
            let library = self.api.library_version_deploy(&params.package).await?;
            return Ok(InstallOutcome::Library { library });
        }

        self.inspector.validate(&params.package)?;
        info!(
            package = %params.package.display(),
            name = ?meta.name,
            version = ?meta.version,
            "Package metadata validated"
        );

        let app_name = resolve_app_name(
            params.app_name.as_deref(),
            meta.name.as_deref(),
            params.base_url.as_deref(),
        )
        .ok_or_else(|| DeployError::Metadata {
            path: params.package.clone(),
            message: "cannot determine the application name; pass --user-app-name".into(),
        })?;

        let deployed = self.api.application_get_status(&[]).await?;
        let existing = find_existing(&deployed, params.base_url.as_deref(), &app_name);
        let poller = DeploymentPoller::new(self.api, self.policy);

        let Some(existing) = existing else {
            return self.deploy(params, app_name, &poller).await;
        };

        let running = existing.classify() == AppStatus::InProgress;
        if params.safe && running && !params.wait {
            warn!(app_id = %existing.id, status = %existing.status, "Refusing to update a running deployment");
            return Err(DeployError::SafeModeConflict {
                app_id: existing.id.clone(),
                status: existing.status.clone(),
            });
        }

        let plan = UpdatePlan {
            app_id: existing.id.clone(),
            package: params.package.clone(),
            user_params: params.user_params.clone(),
            ignore_failures: params.flags.ignore_failures,
        };

        if params.safe && running {
            info!(app_id = %plan.app_id, status = %existing.status, "Waiting for the running deployment to finish");
            if let Some(settled) = poller.wait_idle(&plan.app_id).await? {
                info!(app_id = %settled.id, status = %settled.status, "Previous deployment finished");
            }
        }

        plan.execute(self.api, &poller, params.wait).await
    }

    async fn deploy(
        &self,
        params: &InstallParams,
        app_name: String,
        poller: &DeploymentPoller<'_, A>,
    ) -> DeployResult<InstallOutcome> {
        let base_url = params
            .base_url
            .clone()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| {
                DeployError::InvalidRequest(format!(
                    "application '{app_name}' is not deployed yet; --base-uri is required for a first deployment"
                ))
            })?;

        let request = DeploymentRequest {
            package: params.package.clone(),
            base_url,
            app_name,
            user_params: params.user_params.clone(),
            flags: params.flags,
        };
        let application = self.api.application_deploy(&request).await?;
        let poll = if params.wait {
            Some(poller.wait_deployed(&application.id).await?)
        } else {
            None
        };
        Ok(InstallOutcome::Deployed { application, poll })
    }
}

/// Explicit name, else the package name, else the last path segment of the
/// base URL.
fn resolve_app_name(
    explicit: Option<&str>,
    from_package: Option<&str>,
    base_url: Option<&str>,
) -> Option<String> {
    let non_empty = |s: &&str| !s.trim().is_empty();
    explicit
        .filter(non_empty)
        .or(from_package.filter(non_empty))
        .map(|s| s.trim().to_string())
        .or_else(|| base_url.and_then(name_from_base_url))
}

fn name_from_base_url(base_url: &str) -> Option<String> {
    let path = match base_url.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => base_url,
    };
    path.split('/')
        .filter(|seg| !seg.is_empty())
        .last()
        .map(str::to_string)
}

/// Match by base URL when one was given, otherwise by user application name.
fn find_existing<'d>(
    deployed: &'d [ApplicationRecord],
    base_url: Option<&str>,
    app_name: &str,
) -> Option<&'d ApplicationRecord> {
    match base_url.filter(|b| !b.is_empty()) {
        Some(base_url) => deployed.iter().find(|a| a.base_url == base_url),
        None => deployed.iter().find(|a| a.user_app_name == app_name),
    }
}
