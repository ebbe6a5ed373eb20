use std::{collections::BTreeMap, fmt};

use reqwest::blocking::Client as HttpClient;
use tracing::{debug, info};

use crate::{challenge::ACME_CHALLENGE_LABEL, http, provider::ProviderError};

use super::PROVIDER_NAME;

/// Hurricane Electric 動態 DNS 更新端點。
pub const DEFAULT_BASE_URL: &str = "https://dyn.dns.he.net/nic/update";

/// 網域對應更新 token 的對照表。
///
/// 每個動態 TXT 記錄在 Hurricane Electric 上都有各自的 token，以裸網域（不含
/// `_acme-challenge.`）作為鍵。鍵一律轉為小寫並移除結尾的點。
#[derive(Clone, Default, PartialEq, Eq)]
pub struct TokenMap {
    tokens: BTreeMap<String, String>,
}

impl TokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: impl AsRef<str>, token: impl Into<String>) {
        self.tokens
            .insert(Self::normalize(domain.as_ref()), token.into());
    }

    /// 取得網域的 token；找不到時回傳 [`ProviderError::MissingToken`]。
    pub fn token_for(&self, domain: &str) -> Result<&str, ProviderError> {
        self.tokens
            .get(&Self::normalize(domain))
            .map(String::as_str)
            .ok_or_else(|| ProviderError::MissingToken {
                provider: PROVIDER_NAME,
                domain: domain.to_owned(),
            })
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn normalize(domain: &str) -> String {
        domain.trim_end_matches('.').to_ascii_lowercase()
    }
}

impl fmt::Debug for TokenMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.tokens.keys()).finish()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for TokenMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (domain, token) in iter {
            map.insert(domain, token);
        }
        map
    }
}

/// Hurricane Electric 動態 DNS API 的客戶端。
#[derive(Debug)]
pub struct Client {
    http: HttpClient,
    base_url: String,
    tokens: TokenMap,
}

impl Client {
    pub fn new(http: HttpClient, base_url: impl Into<String>, tokens: TokenMap) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            tokens,
        }
    }

    /// 將 `hostname` 的 TXT 記錄設為 `txt`。
    ///
    /// `hostname` 不含結尾的點，例如 `_acme-challenge.example.com`。
    pub fn update_txt_record(&self, hostname: &str, txt: &str) -> Result<(), ProviderError> {
        let prefix = format!("{}.", ACME_CHALLENGE_LABEL);
        let domain = hostname.strip_prefix(&prefix).unwrap_or(hostname);
        let token = self.tokens.token_for(domain)?;

        let request = self
            .http
            .post(&self.base_url)
            .form(&[("password", token), ("hostname", hostname), ("txt", txt)]);
        let context = format!("update TXT record {}", hostname);
        let (status, body) = http::execute(request, PROVIDER_NAME, &context)?;

        if !status.is_success() {
            return Err(ProviderError::UnexpectedStatus {
                provider: PROVIDER_NAME,
                context,
                status,
                body,
            });
        }

        Self::check_response(domain, hostname, body.trim())
    }

    fn check_response(domain: &str, hostname: &str, code: &str) -> Result<(), ProviderError> {
        let api_error = |message: String| ProviderError::Api {
            provider: PROVIDER_NAME,
            code: code.to_owned(),
            message,
        };

        match code.split_whitespace().next().unwrap_or_default() {
            "good" => {
                debug!(domain, hostname, "TXT record updated");
                Ok(())
            }
            "nochg" => {
                info!(domain, hostname, "Unchanged content written to TXT record");
                Ok(())
            }
            "nohost" => Err(ProviderError::NotFound {
                provider: PROVIDER_NAME,
                context: domain.to_owned(),
                message: format!(
                    "the record provided does not exist in this account: {}",
                    hostname
                ),
            }),
            "abuse" => Err(api_error(format!(
                "{}: blocked hostname for abuse: {}",
                domain, hostname
            ))),
            "badagent" => Err(api_error(format!(
                "{}: user agent not sent or HTTP method not recognized",
                domain
            ))),
            "badauth" => Err(api_error(format!(
                "{}: wrong authentication token provided for TXT record {}",
                domain, hostname
            ))),
            "interval" => Err(api_error(format!(
                "{}: TXT records update exceeded API rate limit",
                domain
            ))),
            "notfqdn" => Err(api_error(format!(
                "{}: the record provided isn't an FQDN: {}",
                domain, hostname
            ))),
            _ => Err(api_error(format!(
                "{}: attempt to change TXT record {} returned {}",
                domain, hostname, code
            ))),
        }
    }
}
