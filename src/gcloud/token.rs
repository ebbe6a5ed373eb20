//! OAuth2 存取權杖來源。
//!
//! 建構時不發出任何網路請求，權杖在第一次需要時才取得，
//! 並由 [`CachedTokenSource`] 快取到到期前 60 秒。

use std::{fmt, sync::Mutex, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    jwt::{Claims, RsaSigner},
    PROVIDER_NAME,
};
use crate::{http, provider::ProviderError};

/// Cloud DNS 讀寫授權範圍。
pub const SCOPE: &str = "https://www.googleapis.com/auth/ndev.clouddns.readwrite";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// 一個帶有到期時間的存取權杖。
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let margin = chrono::Duration::seconds(REFRESH_MARGIN.as_secs() as i64);
        self.expires_at
            .checked_sub_signed(margin)
            .is_some_and(|refresh_at| refresh_at > now)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// 定義取得存取權杖的行為。
pub trait TokenSource: Send + Sync + fmt::Debug {
    fn token(&self) -> Result<AccessToken, ProviderError>;
}

/// OAuth2 token 端點的標準回應。
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_token(self, now: DateTime<Utc>) -> Result<AccessToken, ProviderError> {
        let lifetime = self.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        let expires_at = chrono::Duration::try_seconds(lifetime)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                ProviderError::auth(
                    PROVIDER_NAME,
                    format!("invalid expires_in in token response: {}", lifetime),
                )
            })?;

        Ok(AccessToken {
            token: self.access_token,
            expires_at,
        })
    }
}

fn fetch_token(
    request: reqwest::blocking::RequestBuilder,
    context: &str,
) -> Result<AccessToken, ProviderError> {
    let (status, body) = http::execute(request, PROVIDER_NAME, context)?;
    if !status.is_success() {
        return Err(ProviderError::auth(
            PROVIDER_NAME,
            format!(
                "{}: [status code: {}] body: {}",
                context,
                status.as_u16(),
                body.trim()
            ),
        ));
    }
    let response: TokenResponse = http::parse_json(&body, PROVIDER_NAME, context)?;
    response.into_token(Utc::now())
}

/// 以服務帳戶私鑰簽署 JWT，換取存取權杖。
///
/// 私鑰在取得權杖時才解析。
pub struct ServiceAccountSource {
    http: Client,
    client_email: String,
    private_key: String,
    private_key_id: Option<String>,
    token_uri: String,
    scope: String,
}

impl ServiceAccountSource {
    pub fn new(
        http: Client,
        client_email: impl Into<String>,
        private_key: impl Into<String>,
        private_key_id: Option<String>,
        token_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_email: client_email.into(),
            private_key: private_key.into(),
            private_key_id,
            token_uri: token_uri.into(),
            scope: SCOPE.to_owned(),
        }
    }

    fn assertion(&self) -> Result<String, ProviderError> {
        let signer = RsaSigner::from_pem(self.private_key.as_bytes(), self.private_key_id.clone())
            .map_err(|e| {
                ProviderError::auth(PROVIDER_NAME, format!("invalid service account key: {}", e))
            })?;

        let iat = Utc::now().timestamp();
        let claims = Claims {
            iss: self.client_email.clone(),
            scope: self.scope.clone(),
            aud: self.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
            sub: None,
        };
        signer.sign(&claims).map_err(|e| {
            ProviderError::auth(PROVIDER_NAME, format!("unable to sign assertion: {}", e))
        })
    }
}

impl fmt::Debug for ServiceAccountSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountSource")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl TokenSource for ServiceAccountSource {
    fn token(&self) -> Result<AccessToken, ProviderError> {
        let assertion = self.assertion()?;
        let request = self.http.post(&self.token_uri).form(&[
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion.as_str()),
        ]);
        debug!(client_email = %self.client_email, "Requesting service account token");
        fetch_token(request, "fetch service account token")
    }
}

/// 以 `gcloud auth application-default login` 產生的 refresh token 換取存取權杖。
pub struct AuthorizedUserSource {
    http: Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_uri: String,
}

impl AuthorizedUserSource {
    pub fn new(
        http: Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
        token_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            token_uri: token_uri.into(),
        }
    }
}

impl fmt::Debug for AuthorizedUserSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizedUserSource")
            .field("client_id", &self.client_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl TokenSource for AuthorizedUserSource {
    fn token(&self) -> Result<AccessToken, ProviderError> {
        let request = self.http.post(&self.token_uri).form(&[
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", self.refresh_token.as_str()),
        ]);
        fetch_token(request, "refresh user token")
    }
}

/// 從 GCE metadata server 取得預設服務帳戶的權杖。
#[derive(Debug)]
pub struct MetadataSource {
    http: Client,
    url: String,
}

impl MetadataSource {
    /// `host` 可以是 `169.254.169.254` 這類主機名稱，也可以帶有 scheme。
    pub fn new(http: Client, host: &str) -> Self {
        let host = host.trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_owned()
        } else {
            format!("http://{}", host)
        };
        Self {
            http,
            url: format!(
                "{}/computeMetadata/v1/instance/service-accounts/default/token",
                base
            ),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TokenSource for MetadataSource {
    fn token(&self) -> Result<AccessToken, ProviderError> {
        let request = self
            .http
            .get(&self.url)
            .query(&[("scopes", SCOPE)])
            .header("Metadata-Flavor", "Google");
        fetch_token(request, "fetch metadata server token")
    }
}

#[derive(Debug, Serialize)]
struct GenerateAccessTokenRequest<'a> {
    scope: [&'a str; 1],
    lifetime: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateAccessTokenResponse {
    access_token: String,
    expire_time: DateTime<Utc>,
}

/// 以基礎權杖透過 IAM Credentials API 模擬另一個服務帳戶。
#[derive(Debug)]
pub struct ImpersonatedSource {
    http: Client,
    base: Box<dyn TokenSource>,
    target: String,
    url: String,
}

impl ImpersonatedSource {
    pub const DEFAULT_ENDPOINT: &'static str = "https://iamcredentials.googleapis.com/v1/";

    pub fn new(
        http: Client,
        base: Box<dyn TokenSource>,
        target: impl Into<String>,
        endpoint: &str,
    ) -> Self {
        let target = target.into();
        let url = format!(
            "{}/projects/-/serviceAccounts/{}:generateAccessToken",
            endpoint.trim_end_matches('/'),
            target
        );
        Self {
            http,
            base,
            target,
            url,
        }
    }
}

impl TokenSource for ImpersonatedSource {
    fn token(&self) -> Result<AccessToken, ProviderError> {
        let base = self.base.token()?;
        let context = format!("impersonate service account {}", self.target);
        let request = self
            .http
            .post(&self.url)
            .bearer_auth(&base.token)
            .json(&GenerateAccessTokenRequest {
                scope: [SCOPE],
                lifetime: "3600s",
            });

        let (status, body) = http::execute(request, PROVIDER_NAME, &context)?;
        if !status.is_success() {
            return Err(ProviderError::auth(
                PROVIDER_NAME,
                format!(
                    "{}: [status code: {}] body: {}",
                    context,
                    status.as_u16(),
                    body.trim()
                ),
            ));
        }
        let response: GenerateAccessTokenResponse =
            http::parse_json(&body, PROVIDER_NAME, &context)?;
        Ok(AccessToken {
            token: response.access_token,
            expires_at: response.expire_time,
        })
    }
}

/// 快取權杖，到期前 60 秒才重新取得。
#[derive(Debug)]
pub struct CachedTokenSource {
    inner: Box<dyn TokenSource>,
    cached: Mutex<Option<AccessToken>>,
}

impl CachedTokenSource {
    pub fn new(inner: Box<dyn TokenSource>) -> Self {
        Self {
            inner,
            cached: Mutex::new(None),
        }
    }
}

impl TokenSource for CachedTokenSource {
    fn token(&self) -> Result<AccessToken, ProviderError> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.clone());
        }

        let token = self.inner.token()?;
        *cached = Some(token.clone());
        Ok(token)
    }
}

/// 固定回傳同一個權杖，通常用於測試。
#[derive(Debug, Clone)]
pub struct StaticTokenSource {
    token: AccessToken,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken {
                token: token.into(),
                expires_at: DateTime::<Utc>::MAX_UTC,
            },
        }
    }
}

impl TokenSource for StaticTokenSource {
    fn token(&self) -> Result<AccessToken, ProviderError> {
        Ok(self.token.clone())
    }
}
