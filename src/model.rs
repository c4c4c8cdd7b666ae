use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Connection settings for the management API.
#[derive(Clone)]
pub struct ApiConfig {
    pub url: String,
    pub key_name: String,
    pub key_secret: String,
    pub user_agent: String,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("url", &self.url)
            .field("key_name", &self.key_name)
            .field("key_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// How often and for how long to poll for a deployment to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// `None` polls until the server reports a terminal status.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Some(Duration::from_secs(30 * 60)),
        }
    }
}

/// Classification of a remote application status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppStatus {
    Deployed,
    ErrorLike,
    NotExists,
    InProgress,
}

impl AppStatus {
    /// Map a raw status reported by the server. Total: anything unknown is
    /// treated as a deployment still in progress.
    pub fn classify(status: &str) -> Self {
        match status {
            "deployed" => AppStatus::Deployed,
            "error" => AppStatus::ErrorLike,
            "notExists" => AppStatus::NotExists,
            s if is_error_suffixed(s) => AppStatus::ErrorLike,
            _ => AppStatus::InProgress,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AppStatus::InProgress)
    }
}

/// `stageError`, `uploadError`, ...: at least one word character before a
/// trailing `Error`.
fn is_error_suffixed(status: &str) -> bool {
    status
        .strip_suffix("Error")
        .and_then(|head| head.chars().last())
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Snapshot of one application as listed by the server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationRecord {
    pub id: String,
    pub base_url: String,
    pub user_app_name: String,
    pub status: String,
    /// Error messages attached to the application by the server.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl ApplicationRecord {
    pub fn classify(&self) -> AppStatus {
        AppStatus::classify(&self.status)
    }

    /// Message to surface when the deployment failed.
    pub fn error_message(&self) -> String {
        if self.messages.is_empty() {
            "(no error message reported)".to_string()
        } else {
            self.messages.join("\n")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageType {
    #[default]
    Application,
    Library,
}

/// Metadata read from a package descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMeta {
    pub name: Option<String>,
    pub package_type: PackageType,
    pub version: Option<String>,
}

/// Optional switches forwarded to a fresh deployment. Only the ones that are
/// set are sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployFlags {
    pub create_vhost: bool,
    pub default_server: bool,
    pub ignore_failures: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub package: PathBuf,
    pub base_url: String,
    pub app_name: String,
    pub user_params: BTreeMap<String, String>,
    pub flags: DeployFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub app_id: String,
    pub package: PathBuf,
    pub user_params: BTreeMap<String, String>,
    pub ignore_failures: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LibraryRecord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub status: String,
}

/// Terminal result of a wait-until-deployed loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollOutcome {
    pub final_status: String,
    pub application: ApplicationRecord,
    /// Number of status queries issued.
    pub attempts: u32,
}

/// What an install invocation ended up doing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InstallOutcome {
    Deployed {
        application: ApplicationRecord,
        #[serde(skip_serializing_if = "Option::is_none")]
        poll: Option<PollOutcome>,
    },
    Updated {
        application: ApplicationRecord,
        #[serde(skip_serializing_if = "Option::is_none")]
        poll: Option<PollOutcome>,
    },
    Library {
        library: LibraryRecord,
    },
}
