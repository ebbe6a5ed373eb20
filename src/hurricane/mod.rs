//! Hurricane Electric 動態 DNS Provider。
//!
//! Hurricane Electric 的動態 TXT 記錄只能整筆覆寫，沒有依值刪除的操作，
//! 因此 `present` 直接寫入挑戰值，`clean_up` 則覆寫為佔位值 `"."`。
//! 同一 zone 的並行更新並不安全，Provider 會宣告必須依序處理挑戰。

mod client;

use std::time::Duration;

use tracing::{info, warn};

pub use client::{Client, TokenMap, DEFAULT_BASE_URL};

use crate::{
    challenge::{un_fqdn, ChallengeInfo},
    env::{self, EnvSource, ProcessEnv},
    http,
    provider::{Capabilities, ChallengeProvider, ProviderError, Timeout},
};

pub(crate) const PROVIDER_NAME: &str = "hurricane";

pub const ENV_TOKENS: &str = "HURRICANE_TOKENS";
pub const ENV_PROPAGATION_TIMEOUT: &str = "HURRICANE_PROPAGATION_TIMEOUT";
pub const ENV_POLLING_INTERVAL: &str = "HURRICANE_POLLING_INTERVAL";
pub const ENV_SEQUENCE_INTERVAL: &str = "HURRICANE_SEQUENCE_INTERVAL";
pub const ENV_HTTP_TIMEOUT: &str = "HURRICANE_HTTP_TIMEOUT";

const DEFAULT_PROPAGATION_TIMEOUT: Duration = Duration::from_secs(300);
const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_SEQUENCE_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// 清除挑戰時寫入的佔位值。
pub const CLEANUP_PLACEHOLDER: &str = ".";

/// Hurricane Electric Provider 的設定。
#[derive(Debug, Clone)]
pub struct Config {
    /// 網域對應更新 token
    pub credentials: TokenMap,
    pub propagation_timeout: Duration,
    pub polling_interval: Duration,
    /// 依序處理挑戰時的最小間隔
    pub sequence_interval: Duration,
    pub http_timeout: Duration,
    /// 動態 DNS 更新端點
    pub base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            credentials: TokenMap::new(),
            propagation_timeout: DEFAULT_PROPAGATION_TIMEOUT,
            polling_interval: DEFAULT_POLLING_INTERVAL,
            sequence_interval: DEFAULT_SEQUENCE_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }
}

impl Config {
    /// 從行程環境變數建立設定。
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::from_lookup(&ProcessEnv)
    }

    /// 從指定的環境變數來源建立設定。
    ///
    /// `HURRICANE_TOKENS` 為必要變數，格式為 `domain:token,domain:token`。
    pub fn from_lookup(env: &dyn EnvSource) -> Result<Self, ProviderError> {
        let values = env::get_required(env, &[ENV_TOKENS])
            .map_err(|e| ProviderError::config(PROVIDER_NAME, e.to_string()))?;
        let pairs = env::parse_pairs(&values[ENV_TOKENS])
            .map_err(|e| ProviderError::config(PROVIDER_NAME, format!("credentials: {}", e)))?;

        Ok(Self {
            credentials: pairs.into_iter().collect(),
            ..Self::timings_from(env)
        })
    }

    fn timings_from(env: &dyn EnvSource) -> Self {
        Self {
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
            sequence_interval: env::get_or_default_secs(
                env,
                ENV_SEQUENCE_INTERVAL,
                DEFAULT_SEQUENCE_INTERVAL,
            ),
            http_timeout: env::get_or_default_secs(env, ENV_HTTP_TIMEOUT, DEFAULT_HTTP_TIMEOUT),
            ..Self::default()
        }
    }
}

/// 透過 Hurricane Electric 動態 DNS 完成 DNS-01 挑戰的 Provider。
#[derive(Debug)]
pub struct HurricaneProvider {
    config: Config,
    client: Client,
    capabilities: Capabilities,
}

impl HurricaneProvider {
    /// 以 `HURRICANE_*` 環境變數建立 Provider。
    pub fn from_env() -> Result<Self, ProviderError> {
        Self::new(Config::from_env()?)
    }

    /// 以指定設定建立 Provider，token 對照表為空時回傳設定錯誤。
    pub fn new(config: Config) -> Result<Self, ProviderError> {
        if config.credentials.is_empty() {
            return Err(ProviderError::config(PROVIDER_NAME, "credentials missing"));
        }
        if config.base_url.trim().is_empty() {
            return Err(ProviderError::config(PROVIDER_NAME, "base URL missing"));
        }

        let http = http::build_client(
            PROVIDER_NAME,
            Self::non_zero(config.http_timeout, DEFAULT_HTTP_TIMEOUT),
        )?;
        let client = Client::new(http, config.base_url.clone(), config.credentials.clone());
        let capabilities = Capabilities {
            timeout: Some(Timeout {
                timeout: Self::non_zero(config.propagation_timeout, DEFAULT_PROPAGATION_TIMEOUT),
                interval: Self::non_zero(config.polling_interval, DEFAULT_POLLING_INTERVAL),
            }),
            sequential: Some(Self::non_zero(
                config.sequence_interval,
                DEFAULT_SEQUENCE_INTERVAL,
            )),
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

    fn non_zero(value: Duration, default: Duration) -> Duration {
        if value.is_zero() {
            default
        } else {
            value
        }
    }
}

impl ChallengeProvider for HurricaneProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn present(&self, domain: &str, _token: &str, key_auth: &str) -> Result<(), ProviderError> {
        let info = ChallengeInfo::new(domain, key_auth);
        self.client
            .update_txt_record(un_fqdn(&info.effective_fqdn), &info.value)?;

        info!(domain = %info.domain, fqdn = %info.effective_fqdn, "Presented DNS-01 challenge record");
        Ok(())
    }

    fn clean_up(&self, domain: &str, _token: &str, key_auth: &str) -> Result<(), ProviderError> {
        let info = ChallengeInfo::new(domain, key_auth);
        match self
            .client
            .update_txt_record(un_fqdn(&info.effective_fqdn), CLEANUP_PLACEHOLDER)
        {
            Ok(()) => {
                info!(domain = %info.domain, fqdn = %info.effective_fqdn, "Cleaned up DNS-01 challenge record");
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

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::provider::Resolution;

    #[test]
    fn test_from_lookup() {
        let env = HashMap::from([
            (ENV_TOKENS, "example.org:123,example.com:456"),
            (ENV_SEQUENCE_INTERVAL, "10"),
        ]);
        let config = Config::from_lookup(&env).unwrap();
        assert_eq!(config.credentials.len(), 2);
        assert_eq!(config.credentials.token_for("example.com").unwrap(), "456");
        assert_eq!(config.sequence_interval, Duration::from_secs(10));
        assert_eq!(config.propagation_timeout, DEFAULT_PROPAGATION_TIMEOUT);
        assert_eq!(config.polling_interval, DEFAULT_POLLING_INTERVAL);
        assert_eq!(config.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_from_lookup_missing_tokens() {
        let env: HashMap<&str, &str> = HashMap::new();
        let err = Config::from_lookup(&env).unwrap_err();
        assert_eq!(
            err.to_string(),
            "hurricane: some credentials information are missing: HURRICANE_TOKENS"
        );
    }

    #[test]
    fn test_from_lookup_invalid_pair() {
        let env = HashMap::from([(ENV_TOKENS, "example.org:123,example.net")]);
        let err = Config::from_lookup(&env).unwrap_err();
        assert_eq!(
            err.to_string(),
            "hurricane: credentials: incorrect pair: example.net"
        );
    }

    #[test]
    fn test_new_requires_credentials() {
        let err = HurricaneProvider::new(Config::default()).unwrap_err();
        assert_eq!(err.to_string(), "hurricane: credentials missing");
    }

    #[test]
    fn test_capabilities_are_sequential() {
        let config = Config {
            credentials: [("example.com", "secret")].into_iter().collect(),
            polling_interval: Duration::ZERO,
            ..Config::default()
        };
        let provider = HurricaneProvider::new(config).unwrap();
        let caps = provider.capabilities();

        assert_eq!(
            caps.timeout,
            Some(Timeout {
                timeout: Duration::from_secs(300),
                interval: Duration::from_secs(2),
            })
        );
        assert_eq!(
            caps.resolution(),
            Resolution::Sequential {
                interval: Duration::from_secs(60)
            }
        );
        assert_eq!(provider.name(), "hurricane");
    }

    #[test]
    fn test_env_namespace() {
        const ENV_NAMESPACE: &str = "HURRICANE_";
        for key in [
            ENV_TOKENS,
            ENV_PROPAGATION_TIMEOUT,
            ENV_POLLING_INTERVAL,
            ENV_SEQUENCE_INTERVAL,
            ENV_HTTP_TIMEOUT,
        ] {
            assert!(key.starts_with(ENV_NAMESPACE));
        }
    }
}
