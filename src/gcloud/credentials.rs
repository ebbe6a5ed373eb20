//! Google Cloud 憑證的選擇與載入。
//!
//! 憑證只在建構 Provider 時載入一次，之後轉換為 [`TokenSource`]；
//! 這個過程只讀取本機檔案，不會發出網路請求。

use std::{
    fs,
    path::{Path, PathBuf},
};

use reqwest::blocking::Client;
use serde::Deserialize;

use super::{
    token::{AuthorizedUserSource, MetadataSource, ServiceAccountSource, TokenSource},
    PROVIDER_NAME,
};
use crate::provider::ProviderError;

/// Google OAuth2 token 端點。
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// 憑證來源，依優先順序為內嵌 JSON、金鑰檔、Application Default Credentials。
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credentials {
    /// `GOOGLE_APPLICATION_CREDENTIALS` 指向的檔案、gcloud 的預設檔案，或 metadata server
    #[default]
    ApplicationDefault,
    /// 服務帳戶金鑰檔路徑
    ServiceAccountFile(PathBuf),
    /// 服務帳戶金鑰的 JSON 內容
    InlineServiceAccount(String),
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApplicationDefault => f.write_str("ApplicationDefault"),
            Self::ServiceAccountFile(path) => {
                f.debug_tuple("ServiceAccountFile").field(path).finish()
            }
            Self::InlineServiceAccount(_) => f.write_str("InlineServiceAccount(<redacted>)"),
        }
    }
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_owned()
}

/// 服務帳戶金鑰檔的內容，僅保留需要的欄位。
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// `gcloud auth application-default login` 產生的使用者憑證。
#[derive(Clone, Deserialize)]
pub struct AuthorizedUserKey {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub quota_project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

/// 依 `type` 欄位區分的憑證檔。
#[derive(Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserKey),
}

/// 載入完成、尚未轉換為權杖來源的憑證。
#[derive(Clone)]
pub(crate) enum LoadedCredentials {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserKey),
    Metadata,
}

impl std::fmt::Debug for LoadedCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ServiceAccount(key) => f
                .debug_struct("ServiceAccount")
                .field("client_email", &key.client_email)
                .finish_non_exhaustive(),
            Self::AuthorizedUser(key) => f
                .debug_struct("AuthorizedUser")
                .field("client_id", &key.client_id)
                .finish_non_exhaustive(),
            Self::Metadata => f.write_str("Metadata"),
        }
    }
}

impl Credentials {
    /// 讀取並驗證憑證內容。
    ///
    /// `application_credentials` 只在 [`Credentials::ApplicationDefault`] 時使用；
    /// 沒有檔案時改用 metadata server。
    pub(crate) fn load(
        &self,
        application_credentials: Option<&Path>,
    ) -> Result<LoadedCredentials, ProviderError> {
        match self {
            Self::InlineServiceAccount(json) => parse_service_account(json),
            Self::ServiceAccountFile(path) => {
                let json = fs::read_to_string(path).map_err(|e| {
                    ProviderError::config(
                        PROVIDER_NAME,
                        format!("unable to read Service Account file: {}", e),
                    )
                })?;
                parse_service_account(&json)
            }
            Self::ApplicationDefault => match application_credentials {
                Some(path) => load_application_default(path),
                None => Ok(LoadedCredentials::Metadata),
            },
        }
    }

    /// 是否為服務帳戶金鑰（內嵌或檔案）。
    pub fn is_service_account(&self) -> bool {
        !matches!(self, Self::ApplicationDefault)
    }
}

fn parse_service_account(json: &str) -> Result<LoadedCredentials, ProviderError> {
    let acquire_error = |message: String| {
        ProviderError::config(
            PROVIDER_NAME,
            format!("unable to acquire config: {}", message),
        )
    };

    let key = match serde_json::from_str::<CredentialsFile>(json) {
        Ok(CredentialsFile::ServiceAccount(key)) => key,
        Ok(CredentialsFile::AuthorizedUser(_)) => {
            return Err(acquire_error(
                "credentials file type \"authorized_user\" is not a service account key".into(),
            ))
        }
        Err(e) => return Err(acquire_error(e.to_string())),
    };

    if key.client_email.trim().is_empty() {
        return Err(acquire_error("missing client_email".into()));
    }
    if key.private_key.trim().is_empty() {
        return Err(acquire_error("missing private_key".into()));
    }
    Ok(LoadedCredentials::ServiceAccount(key))
}

fn load_application_default(path: &Path) -> Result<LoadedCredentials, ProviderError> {
    let client_error = |message: String| {
        ProviderError::config(
            PROVIDER_NAME,
            format!("unable to get Google Cloud client: {}", message),
        )
    };

    let json = fs::read_to_string(path).map_err(|e| {
        client_error(format!(
            "error getting credentials using GOOGLE_APPLICATION_CREDENTIALS environment variable: {}",
            e
        ))
    })?;

    match serde_json::from_str::<CredentialsFile>(&json) {
        Ok(CredentialsFile::ServiceAccount(key)) => {
            if key.client_email.trim().is_empty() || key.private_key.trim().is_empty() {
                return Err(client_error(format!(
                    "incomplete service account key in {}",
                    path.display()
                )));
            }
            Ok(LoadedCredentials::ServiceAccount(key))
        }
        Ok(CredentialsFile::AuthorizedUser(key)) => Ok(LoadedCredentials::AuthorizedUser(key)),
        Err(e) => Err(client_error(format!("{}: {}", path.display(), e))),
    }
}

impl LoadedCredentials {
    /// 憑證中記錄的專案 ID。
    pub(crate) fn project_id(&self) -> Option<&str> {
        let project = match self {
            Self::ServiceAccount(key) => key.project_id.as_deref(),
            Self::AuthorizedUser(key) => key.quota_project_id.as_deref(),
            Self::Metadata => None,
        };
        project.filter(|p| !p.trim().is_empty())
    }

    pub(crate) fn into_token_source(self, http: Client, metadata_host: &str) -> Box<dyn TokenSource> {
        match self {
            Self::ServiceAccount(key) => Box::new(ServiceAccountSource::new(
                http,
                key.client_email,
                key.private_key,
                key.private_key_id,
                key.token_uri,
            )),
            Self::AuthorizedUser(key) => Box::new(AuthorizedUserSource::new(
                http,
                key.client_id,
                key.client_secret,
                key.refresh_token,
                key.token_uri,
            )),
            Self::Metadata => Box::new(MetadataSource::new(http, metadata_host)),
        }
    }
}
