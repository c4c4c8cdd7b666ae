//! JSON response envelopes of the management Web API.
//!
//! Every response is `{"requestData": ..., "responseData": ...}` on success
//! or carries `errorData` instead. Single-element lists are sometimes
//! rendered as a bare object and ids as numbers, so both forms are accepted.

use crate::error::{DeployError, DeployResult};
use crate::model::{ApplicationRecord, LibraryRecord};
use serde::{Deserialize, Deserializer};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Envelope<T> {
    pub response_data: Option<T>,
    pub error_data: Option<ErrorData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ErrorData {
    #[serde(default)]
    pub error_code: String,
    #[serde(default)]
    pub error_message: String,
}

impl<T> Envelope<T> {
    pub(crate) fn into_result(self, method: &'static str) -> DeployResult<T> {
        if let Some(err) = self.error_data {
            return Err(DeployError::RemoteApi {
                method,
                code: err.error_code,
                message: err.error_message,
            });
        }
        self.response_data.ok_or_else(|| DeployError::RemoteApi {
            method,
            code: "emptyResponse".into(),
            message: "response carried no responseData".into(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(v) => v,
            OneOrMany::One(one) => vec![one],
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApplicationsList {
    #[serde(default)]
    pub applications_list: OneOrMany<ApplicationInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApplicationResponse {
    pub application_info: ApplicationInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApplicationInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub user_app_name: String,
    #[serde(default)]
    pub status: String,
    /// `{"error": ..., "warning": ..., "info": ...}`, or `[]` when empty.
    #[serde(default)]
    pub message_list: serde_json::Value,
}

impl From<ApplicationInfo> for ApplicationRecord {
    fn from(info: ApplicationInfo) -> Self {
        let messages = error_messages(&info.message_list);
        let user_app_name = if info.user_app_name.is_empty() {
            info.app_name
        } else {
            info.user_app_name
        };
        ApplicationRecord {
            id: info.id,
            base_url: info.base_url,
            user_app_name,
            status: info.status,
            messages,
        }
    }
}

fn error_messages(list: &serde_json::Value) -> Vec<String> {
    match list.get("error") {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LibraryResponse {
    pub library_info: LibraryInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LibraryInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub library_id: String,
    #[serde(default)]
    pub library_name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub status: String,
}

impl From<LibraryInfo> for LibraryRecord {
    fn from(info: LibraryInfo) -> Self {
        LibraryRecord {
            id: info.library_id,
            name: info.library_name,
            version: info.version,
            status: info.status,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applications_list_with_mixed_shapes() {
        let body = r#"{
            "requestData": {"apiKeyName": "deploy", "method": "applicationGetStatus"},
            "responseData": {"applicationsList": [
                {"id": 4, "baseUrl": "http://default-server/blog", "appName": "blog",
                 "userAppName": "", "status": "deployed", "messageList": []},
                {"id": "9", "baseUrl": "http://shop.local/", "appName": "shop",
                 "userAppName": "Shop", "status": "stageError",
                 "messageList": {"error": ["script failed", "rolled back"]}}
            ]}
        }"#;
        let env: Envelope<ApplicationsList> = serde_json::from_str(body).unwrap();
        let apps: Vec<ApplicationRecord> = env
            .into_result("applicationGetStatus")
            .unwrap()
            .applications_list
            .into_vec()
            .into_iter()
            .map(ApplicationRecord::from)
            .collect();

        assert_eq!(apps.len(), 2);
        assert_eq!(apps[0].id, "4");
        assert_eq!(apps[0].user_app_name, "blog");
        assert!(apps[0].messages.is_empty());
        assert_eq!(apps[1].user_app_name, "Shop");
        assert_eq!(apps[1].messages, vec!["script failed", "rolled back"]);
    }

    #[test]
    fn test_single_application_rendered_as_object() {
        let body = r#"{"responseData": {"applicationsList":
            {"id": "2", "baseUrl": "/x", "userAppName": "x", "status": "deploying",
             "messageList": {"error": "still busy"}}}}"#;
        let env: Envelope<ApplicationsList> = serde_json::from_str(body).unwrap();
        let apps = env.into_result("applicationGetStatus").unwrap().applications_list.into_vec();
        assert_eq!(apps.len(), 1);
        let record = ApplicationRecord::from(apps.into_iter().next().unwrap());
        assert_eq!(record.messages, vec!["still busy"]);
    }

    #[test]
    fn test_empty_list_and_missing_list() {
        let env: Envelope<ApplicationsList> =
            serde_json::from_str(r#"{"responseData": {"applicationsList": []}}"#).unwrap();
        assert!(env.into_result("m").unwrap().applications_list.into_vec().is_empty());

        let env: Envelope<ApplicationsList> =
            serde_json::from_str(r#"{"responseData": {}}"#).unwrap();
        assert!(env.into_result("m").unwrap().applications_list.into_vec().is_empty());
    }

    #[test]
    fn test_error_data_becomes_remote_api_error() {
        let body = r#"{"requestData": {}, "errorData": {"errorCode": "authError",
            "errorMessage": "Unknown API key"}}"#;
        let env: Envelope<ApplicationsList> = serde_json::from_str(body).unwrap();
        match env.into_result("applicationGetStatus").unwrap_err() {
            DeployError::RemoteApi { method, code, message } => {
                assert_eq!(method, "applicationGetStatus");
                assert_eq!(code, "authError");
                assert_eq!(message, "Unknown API key");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_response_data() {
        let env: Envelope<ApplicationResponse> = serde_json::from_str(r#"{"requestData": {}}"#).unwrap();
        let err = env.into_result("applicationDeploy").unwrap_err();
        assert!(err.to_string().contains("emptyResponse"));
    }

    #[test]
    fn test_library_response() {
        let body = r#"{"responseData": {"libraryInfo": {"libraryId": 12,
            "libraryName": "zf2", "version": "2.4.0", "status": "deploying"}}}"#;
        let env: Envelope<LibraryResponse> = serde_json::from_str(body).unwrap();
        let lib = LibraryRecord::from(env.into_result("libraryVersionDeploy").unwrap().library_info);
        assert_eq!(lib.id, "12");
        assert_eq!(lib.version.as_deref(), Some("2.4.0"));
    }
}
