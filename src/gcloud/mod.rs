//! Google Cloud DNS Provider。
//!
//! TXT 記錄以記錄集（RRSet）管理，同一名稱可以同時存在多個挑戰值。
//! `present` 會把新值併入既有的記錄集，`clean_up` 只移除自己的值並保留其餘內容，
//! 兩者都以單一原子性的 change 完成（刪除舊記錄集並新增合併後的記錄集）。

mod client;
mod credentials;
mod jwt;
mod token;
mod types;

use std::{path::PathBuf, time::Duration};

use tracing::{debug, info, warn};

pub use client::{Client, DEFAULT_BASE_URL};
pub use credentials::{AuthorizedUserKey, Credentials, ServiceAccountKey, DEFAULT_TOKEN_URI};
pub use jwt::{Claims, JwtError, RsaSigner};
pub use token::{
    AccessToken, AuthorizedUserSource, CachedTokenSource, ImpersonatedSource, MetadataSource,
    ServiceAccountSource, StaticTokenSource, TokenSource, SCOPE,
};
pub use types::{quote_txt, unquote_txt, Change, ManagedZone, ResourceRecordSet};

use crate::{
    challenge::{domain_suffixes, ChallengeInfo},
    env::{self, EnvSource, ProcessEnv},
    http,
    provider::{Capabilities, ChallengeProvider, ProviderError, Timeout},
};

pub(crate) const PROVIDER_NAME: &str = "googlecloud";

pub const ENV_PROJECT: &str = "GCE_PROJECT";
pub const ENV_SERVICE_ACCOUNT: &str = "GCE_SERVICE_ACCOUNT";
pub const ENV_SERVICE_ACCOUNT_FILE: &str = "GCE_SERVICE_ACCOUNT_FILE";
pub const ENV_IMPERSONATE_SERVICE_ACCOUNT: &str = "GCE_IMPERSONATE_SERVICE_ACCOUNT";
pub const ENV_ZONE_ID: &str = "GCE_ZONE_ID";
pub const ENV_ALLOW_PRIVATE_ZONE: &str = "GCE_ALLOW_PRIVATE_ZONE";
pub const ENV_TTL: &str = "GCE_TTL";
pub const ENV_PROPAGATION_TIMEOUT: &str = "GCE_PROPAGATION_TIMEOUT";
pub const ENV_POLLING_INTERVAL: &str = "GCE_POLLING_INTERVAL";
pub const ENV_HTTP_TIMEOUT: &str = "GCE_HTTP_TIMEOUT";
pub const ENV_METADATA_HOST: &str = "GCE_METADATA_HOST";
pub const ENV_GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

const DEFAULT_TTL: u32 = 120;
const DEFAULT_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(180);
const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_METADATA_HOST: &str = "169.254.169.254";

/// gcloud CLI 寫入 Application Default Credentials 的位置（相對於 `$HOME`）。
const WELL_KNOWN_ADC_FILE: &str = ".config/gcloud/application_default_credentials.json";

/// Google Cloud DNS Provider 的設定。
#[derive(Debug, Clone)]
pub struct Config {
    /// 專案 ID；未設定時使用憑證檔中的專案
    pub project: Option<String>,
    pub credentials: Credentials,
    /// 以此服務帳戶身分操作 DNS
    pub impersonate_service_account: Option<String>,
    /// 指定託管 zone 名稱，設定後不再搜尋 zone
    pub zone_id: Option<String>,
    /// 是否接受 private zone
    pub allow_private_zone: bool,
    pub ttl: u32,
    pub propagation_timeout: Duration,
    pub polling_interval: Duration,
    pub http_timeout: Duration,
    pub base_url: String,
    /// Application Default Credentials 檔案
    pub application_credentials: Option<PathBuf>,
    pub metadata_host: String,
    pub iam_credentials_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: None,
            credentials: Credentials::ApplicationDefault,
            impersonate_service_account: None,
            zone_id: None,
            allow_private_zone: false,
            ttl: DEFAULT_TTL,
            propagation_timeout: DEFAULT_PROPAGATION_TIMEOUT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            base_url: DEFAULT_BASE_URL.to_owned(),
            application_credentials: None,
            metadata_host: DEFAULT_METADATA_HOST.to_owned(),
            iam_credentials_url: ImpersonatedSource::DEFAULT_ENDPOINT.to_owned(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::from_lookup(&ProcessEnv)
    }

    /// 從指定的環境變數來源建立設定。
    ///
    /// 憑證依 `GCE_SERVICE_ACCOUNT`、`GCE_SERVICE_ACCOUNT_FILE`、
    /// Application Default Credentials 的順序選擇。
    pub fn from_lookup(env: &dyn EnvSource) -> Result<Self, ProviderError> {
        let credentials = if let Some(json) = env.var(ENV_SERVICE_ACCOUNT) {
            Credentials::InlineServiceAccount(json)
        } else if let Some(path) = env.var(ENV_SERVICE_ACCOUNT_FILE) {
            Credentials::ServiceAccountFile(PathBuf::from(path))
        } else {
            Credentials::ApplicationDefault
        };

        let application_credentials = env
            .var(ENV_GOOGLE_APPLICATION_CREDENTIALS)
            .map(PathBuf::from)
            .or_else(|| {
                env.var("HOME")
                    .map(|home| PathBuf::from(home).join(WELL_KNOWN_ADC_FILE))
                    .filter(|path| path.is_file())
            });

        Ok(Self {
            project: env.var(ENV_PROJECT),
            credentials,
            impersonate_service_account: env.var(ENV_IMPERSONATE_SERVICE_ACCOUNT),
            zone_id: env.var(ENV_ZONE_ID),
            allow_private_zone: env::get_or_default_bool(env, ENV_ALLOW_PRIVATE_ZONE, false),
            ttl: env::get_or_default_u32(env, ENV_TTL, DEFAULT_TTL),
            propagation_timeout: env::get_or_default_secs(
                env,
                ENV_PROPAGATION_TIMEOUT,
                DEFAULT_PROPAGATION_TIMEOUT,
            ),
            polling_interval: env::get_or_default_secs(
                env,
                ENV_POLLING_INTERVAL,
                DEFAULT_POLLING_INTERVAL,
            ),
            http_timeout: env::get_or_default_secs(env, ENV_HTTP_TIMEOUT, DEFAULT_HTTP_TIMEOUT),
            application_credentials,
            metadata_host: env::get_or_default_string(
                env,
                ENV_METADATA_HOST,
                DEFAULT_METADATA_HOST,
            ),
            ..Self::default()
        })
    }
}

/// 透過 Google Cloud DNS 完成 DNS-01 挑戰的 Provider。
#[derive(Debug)]
pub struct GoogleCloudProvider {
    config: Config,
    client: Client,
    capabilities: Capabilities,
}

impl GoogleCloudProvider {
    /// 以 `GCE_*` 環境變數建立 Provider。
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(Config::from_env()?)
    }

    /// 以指定設定建立 Provider。
    ///
    /// 會讀取並驗證憑證，但不發出任何網路請求；權杖在第一次呼叫 API 時才取得。
    pub fn new(config: Config) -> Result<Self, ProviderError> {
        let http = http::build_client(
            PROVIDER_NAME,
            non_zero(config.http_timeout, DEFAULT_HTTP_TIMEOUT),
        )?;

        let loaded = config
            .credentials
            .load(config.application_credentials.as_deref())?;
        debug!(credentials = ?loaded, "Loaded Google Cloud credentials");

        let project = match non_empty(config.project.as_deref()).or(loaded.project_id()) {
            Some(project) => project.to_owned(),
            None if config.credentials.is_service_account() => {
                return Err(ProviderError::config(
                    PROVIDER_NAME,
                    "project ID not found in Google Cloud Service Account file",
                ))
            }
            None => return Err(ProviderError::config(PROVIDER_NAME, "project name missing")),
        };

        let mut tokens = loaded.into_token_source(http.clone(), &config.metadata_host);
        if let Some(target) = non_empty(config.impersonate_service_account.as_deref()) {
            tokens = Box::new(ImpersonatedSource::new(
                http.clone(),
                tokens,
                target,
                &config.iam_credentials_url,
            ));
        }

        Self::with_http(
            Config {
                project: Some(project),
                ..config
            },
            http,
            Box::new(CachedTokenSource::new(tokens)),
        )
    }

    /// 以自訂的權杖來源建立 Provider，設定中必須帶有專案 ID。
    pub fn with_token_source(
        config: Config,
        tokens: Box<dyn TokenSource>,
    ) -> Result<Self, ProviderError> {
        let http = http::build_client(
            PROVIDER_NAME,
            non_zero(config.http_timeout, DEFAULT_HTTP_TIMEOUT),
        )?;
        Self::with_http(config, http, tokens)
    }

    /// 權杖來源與 DNS API 共用同一個 HTTP 客戶端。
    fn with_http(
        config: Config,
        http: reqwest::blocking::Client,
        tokens: Box<dyn TokenSource>,
    ) -> Result<Self, ProviderError> {
        let project = non_empty(config.project.as_deref())
            .ok_or_else(|| ProviderError::config(PROVIDER_NAME, "project name missing"))?
            .to_owned();
        if config.base_url.trim().is_empty() {
            return Err(ProviderError::config(PROVIDER_NAME, "base URL missing"));
        }

        let client = Client::new(http, config.base_url.clone(), project, tokens);
        let capabilities = Capabilities {
            timeout: Some(Timeout {
                timeout: non_zero(config.propagation_timeout, DEFAULT_PROPAGATION_TIMEOUT),
                interval: non_zero(config.polling_interval, DEFAULT_POLLING_INTERVAL),
            }),
            sequential: None,
        };

        Ok(Self {
            config,
            client,
            capabilities,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project(&self) -> &str {
        self.client.project()
    }

    /// 找出負責 `domain` 的託管 zone 名稱。
    ///
    /// 設定了 `zone_id` 時直接使用；否則由長至短查詢網域的各個後綴。
    fn hosted_zone(&self, domain: &str) -> Result<String, ProviderError> {
        if let Some(zone) = non_empty(self.config.zone_id.as_deref()) {
            return Ok(zone.to_owned());
        }

        let mut found_private = false;
        for candidate in domain_suffixes(domain) {
            let zones = self.client.list_managed_zones(&candidate)?;
            if let Some(zone) = zones
                .iter()
                .find(|z| self.config.allow_private_zone || z.is_public())
            {
                debug!(domain, zone = %zone.name, dns_name = %candidate, "Found hosted zone");
                return Ok(zone.name.clone());
            }
            found_private |= !zones.is_empty();
        }

        let message = if found_private {
            format!("no public zone found for domain {}", domain)
        } else {
            format!("no matching domain found for domain {}", domain)
        };
        Err(ProviderError::ZoneNotFound {
            provider: PROVIDER_NAME,
            domain: domain.to_owned(),
            message,
        })
    }

    fn apply_change(&self, zone: &str, change: &Change) -> Result<(), ProviderError> {
        let applied = self.client.create_change(zone, change)?;
        if applied.is_pending() {
            info!(
                zone,
                change_id = applied.id.as_deref().unwrap_or_default(),
                "Change submitted and still pending"
            );
        }
        Ok(())
    }
}

impl ChallengeProvider for GoogleCloudProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn present(&self, domain: &str, _token: &str, key_auth: &str) -> Result<(), ProviderError> {
        let info = ChallengeInfo::new(domain, key_auth);
        let zone = self.hosted_zone(&info.domain)?;
        let existing = self.client.list_txt_records(&zone, &info.effective_fqdn)?;

        if existing
            .iter()
            .flat_map(|rrs| rrs.txt_values())
            .any(|value| value == info.value)
        {
            info!(domain = %info.domain, fqdn = %info.effective_fqdn, "Challenge value already present, skipping");
            return Ok(());
        }

        let mut rrdatas: Vec<String> = Vec::new();
        for data in existing.iter().flat_map(|rrs| rrs.rrdatas.iter()) {
            if !rrdatas.contains(data) {
                rrdatas.push(data.clone());
            }
        }
        rrdatas.push(quote_txt(&info.value));

        let change = Change {
            additions: vec![ResourceRecordSet::txt(
                info.effective_fqdn.clone(),
                self.config.ttl,
                rrdatas,
            )],
            deletions: existing,
            ..Change::default()
        };
        self.apply_change(&zone, &change)?;

        info!(domain = %info.domain, fqdn = %info.effective_fqdn, zone = %zone, "Presented DNS-01 challenge record");
        Ok(())
    }

    fn clean_up(&self, domain: &str, _token: &str, key_auth: &str) -> Result<(), ProviderError> {
        let info = ChallengeInfo::new(domain, key_auth);
        let zone = self.hosted_zone(&info.domain)?;
        let existing = self.client.list_txt_records(&zone, &info.effective_fqdn)?;

        let total: usize = existing.iter().map(|rrs| rrs.rrdatas.len()).sum();
        let remaining: Vec<String> = existing
            .iter()
            .flat_map(|rrs| rrs.rrdatas.iter())
            .filter(|data| unquote_txt(data) != info.value)
            .cloned()
            .collect();
        if remaining.len() == total {
            debug!(domain = %info.domain, fqdn = %info.effective_fqdn, "No challenge record to clean up");
            return Ok(());
        }

        let ttl = existing
            .first()
            .map(|rrs| rrs.ttl)
            .filter(|ttl| *ttl > 0)
            .unwrap_or(self.config.ttl);
        let additions = if remaining.is_empty() {
            Vec::new()
        } else {
            vec![ResourceRecordSet::txt(
                info.effective_fqdn.clone(),
                ttl,
                remaining,
            )]
        };
        let change = Change {
            additions,
            deletions: existing,
            ..Change::default()
        };

        match self.apply_change(&zone, &change) {
            Ok(()) => {
                info!(domain = %info.domain, fqdn = %info.effective_fqdn, zone = %zone, "Cleaned up DNS-01 challenge record");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!(domain = %info.domain, error = %e, "Challenge record already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn non_zero(value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        default
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use tempfile::NamedTempFile;

    use super::*;
    use crate::provider::Resolution;

    const SERVICE_ACCOUNT: &str = r#"{"project_id": "A","type": "service_account","client_email": "foo@bar.com","private_key_id": "pki","private_key": "pk","token_uri": "/token","client_secret": "secret","client_id": "C","refresh_token": "D"}"#;

    #[test]
    fn test_from_lookup_defaults() {
        let env: HashMap<&str, &str> = HashMap::from([(ENV_PROJECT, "manhattan")]);
        let config = Config::from_lookup(&env).unwrap();
        assert_eq!(config.project.as_deref(), Some("manhattan"));
        assert_eq!(config.credentials, Credentials::ApplicationDefault);
        assert_eq!(config.ttl, 120);
        assert_eq!(config.propagation_timeout, Duration::from_secs(180));
        assert_eq!(config.polling_interval, Duration::from_secs(5));
        assert_eq!(config.http_timeout, Duration::from_secs(30));
        assert_eq!(config.metadata_host, "169.254.169.254");
        assert!(!config.allow_private_zone);
        assert!(config.application_credentials.is_none());
    }

    #[test]
    fn test_from_lookup_credentials_precedence() {
        let env = HashMap::from([
            (ENV_SERVICE_ACCOUNT, SERVICE_ACCOUNT),
            (ENV_SERVICE_ACCOUNT_FILE, "/etc/key.json"),
        ]);
        let config = Config::from_lookup(&env).unwrap();
        assert!(matches!(
            config.credentials,
            Credentials::InlineServiceAccount(_)
        ));

        let env = HashMap::from([(ENV_SERVICE_ACCOUNT_FILE, "/etc/key.json")]);
        let config = Config::from_lookup(&env).unwrap();
        assert_eq!(
            config.credentials,
            Credentials::ServiceAccountFile("/etc/key.json".into())
        );
    }

    #[test]
    fn test_from_lookup_optional_values() {
        let env = HashMap::from([
            (ENV_ZONE_ID, "my-zone"),
            (ENV_ALLOW_PRIVATE_ZONE, "true"),
            (ENV_TTL, "300"),
            (ENV_IMPERSONATE_SERVICE_ACCOUNT, "dns@p.iam.gserviceaccount.com"),
            (ENV_GOOGLE_APPLICATION_CREDENTIALS, "/tmp/adc.json"),
        ]);
        let config = Config::from_lookup(&env).unwrap();
        assert_eq!(config.zone_id.as_deref(), Some("my-zone"));
        assert!(config.allow_private_zone);
        assert_eq!(config.ttl, 300);
        assert_eq!(
            config.impersonate_service_account.as_deref(),
            Some("dns@p.iam.gserviceaccount.com")
        );
        assert_eq!(
            config.application_credentials,
            Some(PathBuf::from("/tmp/adc.json"))
        );
    }

    #[test]
    fn test_new_missing_project() {
        let err = GoogleCloudProvider::new(Config::default()).unwrap_err();
        assert_eq!(err.to_string(), "googlecloud: project name missing");
    }

    #[test]
    fn test_new_invalid_application_credentials() {
        let config = Config {
            project: Some("123".into()),
            application_credentials: Some("not-a-secret-file".into()),
            ..Config::default()
        };
        let err = GoogleCloudProvider::new(config).unwrap_err();
        assert!(err.to_string().starts_with(
            "googlecloud: unable to get Google Cloud client: error getting credentials using GOOGLE_APPLICATION_CREDENTIALS environment variable: "
        ));
    }

    #[test]
    fn test_new_with_inline_key_uses_key_project() {
        let env = HashMap::from([(ENV_SERVICE_ACCOUNT, SERVICE_ACCOUNT)]);
        let provider = GoogleCloudProvider::new(Config::from_lookup(&env).unwrap()).unwrap();
        assert_eq!(provider.project(), "A");
        assert_eq!(provider.name(), "googlecloud");
    }

    #[test]
    fn test_new_with_key_file_and_project_override() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(SERVICE_ACCOUNT.as_bytes()).unwrap();

        let config = Config {
            project: Some("override".into()),
            credentials: Credentials::ServiceAccountFile(file.path().to_path_buf()),
            ..Config::default()
        };
        let provider = GoogleCloudProvider::new(config).unwrap();
        assert_eq!(provider.project(), "override");
    }

    #[test]
    fn test_new_key_without_project() {
        let config = Config {
            credentials: Credentials::InlineServiceAccount(
                r#"{"type":"service_account","client_email":"foo@bar.com","private_key":"pk"}"#
                    .into(),
            ),
            ..Config::default()
        };
        let err = GoogleCloudProvider::new(config).unwrap_err();
        assert_eq!(
            err.to_string(),
            "googlecloud: project ID not found in Google Cloud Service Account file"
        );
    }

    #[test]
    fn test_new_rejects_empty_base_url() {
        let env = HashMap::from([(ENV_SERVICE_ACCOUNT, SERVICE_ACCOUNT)]);
        let config = Config {
            base_url: " ".into(),
            ..Config::from_lookup(&env).unwrap()
        };
        let err = GoogleCloudProvider::new(config).unwrap_err();
        assert_eq!(err.to_string(), "googlecloud: base URL missing");
    }

    #[test]
    fn test_capabilities_are_parallel() {
        let config = Config {
            project: Some("manhattan".into()),
            propagation_timeout: Duration::ZERO,
            ..Config::default()
        };
        let provider =
            GoogleCloudProvider::with_token_source(config, Box::new(StaticTokenSource::new("t")))
                .unwrap();
        let caps = provider.capabilities();
        assert_eq!(
            caps.timeout,
            Some(Timeout {
                timeout: Duration::from_secs(180),
                interval: Duration::from_secs(5),
            })
        );
        assert_eq!(caps.resolution(), Resolution::Parallel);
    }

    #[test]
    fn test_configured_zone_skips_lookup() {
        let config = Config {
            project: Some("manhattan".into()),
            zone_id: Some("pinned".into()),
            base_url: "http://127.0.0.1:9/dns/v1/".into(),
            ..Config::default()
        };
        let provider =
            GoogleCloudProvider::with_token_source(config, Box::new(StaticTokenSource::new("t")))
                .unwrap();
        assert_eq!(provider.hosted_zone("example.com").unwrap(), "pinned");
    }
}
