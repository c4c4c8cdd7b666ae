use super::signature::{request_date, signature_header, SIGNATURE_HEADER};
use super::wire::{ApplicationResponse, ApplicationsList, Envelope, LibraryResponse};
use super::ServerApi;
use crate::error::{DeployError, DeployResult};
use crate::model::{ApiConfig, ApplicationRecord, DeploymentRequest, LibraryRecord, UpdateRequest};
use bytes::Bytes;
use reqwest::header::{ACCEPT, DATE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const API_PREFIX: &str = "ZendServer/Api";
const ACCEPT_JSON: &str = "application/vnd.zend.serverapi+json;version=1.3";
const APP_PACKAGE_MIME: &str = "application/vnd.zend.applicationpackage";

/// Management Web API client over HTTPS.
pub(crate) struct ZendClient {
    http: Client,
    base: Url,
    key_name: String,
    key_secret: String,
    user_agent: String,
}

impl ZendClient {
    pub(crate) fn new(cfg: &ApiConfig) -> DeployResult<Self> {
        let mut base = Url::parse(&cfg.url)
            .map_err(|e| DeployError::Config(format!("invalid server URL '{}': {e}", cfg.url)))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        // Uploads of large packages can take a while; status calls are short.
        let http = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|source| DeployError::Transport {
                method: "client",
                source,
            })?;

        Ok(Self {
            http,
            base,
            key_name: cfg.key_name.clone(),
            key_secret: cfg.key_secret.clone(),
            user_agent: cfg.user_agent.clone(),
        })
    }

    fn endpoint(&self, method: &str) -> DeployResult<Url> {
        self.base
            .join(&format!("{API_PREFIX}/{method}"))
            .map_err(|e| DeployError::Config(format!("invalid endpoint for {method}: {e}")))
    }

    /// Attach the `Date`, `Accept` and signature headers for `url`.
    fn sign(&self, builder: RequestBuilder, url: &Url) -> DeployResult<RequestBuilder> {
        let date = request_date(time::OffsetDateTime::now_utc())?;
        let host = format!(
            "{}:{}",
            url.host_str().unwrap_or_default(),
            url.port_or_known_default().unwrap_or(80)
        );
        let signature = signature_header(
            &self.key_name,
            &self.key_secret,
            &host,
            url.path(),
            &self.user_agent,
            &date,
        )?;
        Ok(builder
            .header(DATE, date)
            .header(ACCEPT, ACCEPT_JSON)
            .header(SIGNATURE_HEADER, signature))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        request: RequestBuilder,
    ) -> DeployResult<T> {
        let response = request
            .send()
            .await
            .map_err(|source| DeployError::Transport { method, source })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|source| DeployError::Transport { method, source })?;
        debug!(method, status = %status, bytes = body.len(), "Web API response");
        decode_envelope(method, status, &body)
    }

    async fn package_part(method: &'static str, package: &Path) -> DeployResult<Part> {
        let content: Bytes = tokio::fs::read(package)
            .await
            .map_err(|source| DeployError::PackageRead {
                path: package.to_path_buf(),
                source,
            })?
            .into();
        let file_name = package
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package.zpk".to_string());
        debug!(method, file = %file_name, bytes = content.len(), "Uploading package");
        let len = content.len() as u64;
        Part::stream_with_length(reqwest::Body::from(content), len)
            .file_name(file_name)
            .mime_str(APP_PACKAGE_MIME)
            .map_err(|source| DeployError::Transport { method, source })
    }
}

/// Turn a raw response into the typed payload. `errorData` wins over the
/// HTTP status so the server's own message reaches the user.
fn decode_envelope<T: DeserializeOwned>(
    method: &'static str,
    status: reqwest::StatusCode,
    body: &[u8],
) -> DeployResult<T> {
    match serde_json::from_slice::<Envelope<T>>(body) {
        Ok(env) if env.error_data.is_some() || status.is_success() => env.into_result(method),
        Ok(_) => Err(DeployError::RemoteApi {
            method,
            code: status.as_u16().to_string(),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected HTTP status")
                .to_string(),
        }),
        Err(e) if status.is_success() => Err(DeployError::RemoteApi {
            method,
            code: "malformedResponse".into(),
            message: e.to_string(),
        }),
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let snippet: String = text.trim().chars().take(200).collect();
            Err(DeployError::RemoteApi {
                method,
                code: status.as_u16().to_string(),
                message: if snippet.is_empty() {
                    status.canonical_reason().unwrap_or("no body").to_string()
                } else {
                    snippet
                },
            })
        }
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "TRUE"
    } else {
        "FALSE"
    }
}

fn with_user_params(mut form: Form, params: &BTreeMap<String, String>) -> Form {
    for (key, value) in params {
        form = form.text(format!("userParams[{key}]"), value.clone());
    }
    form
}

impl ServerApi for ZendClient {
    async fn application_get_status(&self, app_ids: &[String]) -> DeployResult<Vec<ApplicationRecord>> {
        let method = "applicationGetStatus";
        let url = self.endpoint(method)?;
        let query: Vec<(String, &str)> = app_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (format!("applications[{i}]"), id.as_str()))
            .collect();
        let request = self.sign(self.http.get(url.clone()).query(&query), &url)?;
        let list: ApplicationsList = self.call(method, request).await?;
        let apps: Vec<ApplicationRecord> = list
            .applications_list
            .into_vec()
            .into_iter()
            .map(ApplicationRecord::from)
            .collect();
        debug!(method, filter = ?app_ids, count = apps.len(), "Listed applications");
        Ok(apps)
    }

    async fn application_deploy(&self, request: &DeploymentRequest) -> DeployResult<ApplicationRecord> {
        let method = "applicationDeploy";
        let url = self.endpoint(method)?;
        let mut form = Form::new()
            .part("appPackage", Self::package_part(method, &request.package).await?)
            .text("baseUrl", request.base_url.clone())
            .text("userAppName", request.app_name.clone());
        if request.flags.create_vhost {
            form = form.text("createVhost", flag(true));
        }
        if request.flags.default_server {
            form = form.text("defaultServer", flag(true));
        }
        if request.flags.ignore_failures {
            form = form.text("ignoreFailures", flag(true));
        }
        form = with_user_params(form, &request.user_params);

        info!(
            app = %request.app_name,
            base_url = %request.base_url,
            package = %request.package.display(),
            "Deploying new application"
        );
        let builder = self.sign(self.http.post(url.clone()).multipart(form), &url)?;
        let response: ApplicationResponse = self.call(method, builder).await?;
        Ok(response.application_info.into())
    }

    async fn application_update(&self, request: &UpdateRequest) -> DeployResult<ApplicationRecord> {
        let method = "applicationUpdate";
        let url = self.endpoint(method)?;
        let mut form = Form::new()
            .text("appId", request.app_id.clone())
            .part("appPackage", Self::package_part(method, &request.package).await?);
        if request.ignore_failures {
            form = form.text("ignoreFailures", flag(true));
        }
        form = with_user_params(form, &request.user_params);

        info!(
            app_id = %request.app_id,
            package = %request.package.display(),
            "Updating application"
        );
        let builder = self.sign(self.http.post(url.clone()).multipart(form), &url)?;
        let response: ApplicationResponse = self.call(method, builder).await?;
        Ok(response.application_info.into())
    }

    async fn library_version_deploy(&self, package: &Path) -> DeployResult<LibraryRecord> {
        let method = "libraryVersionDeploy";
        let url = self.endpoint(method)?;
        let form = Form::new().part("libPackage", Self::package_part(method, package).await?);

        info!(package = %package.display(), "Deploying library");
        let builder = self.sign(self.http.post(url.clone()).multipart(form), &url)?;
        let response: LibraryResponse = self.call(method, builder).await?;
        Ok(response.library_info.into())
    }
}
