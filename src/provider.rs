//! DNS-01 Provider 與外部調度器之間的契約。
//!
//! 調度器透過 [`ChallengeProvider`] 呼叫 `present` / `clean_up`，
//! 並以 [`Capabilities`] 得知 Provider 是否需要自訂傳播等待時間或必須依序處理挑戰。

use std::{fmt, time::Duration};

use reqwest::StatusCode;
use thiserror::Error;

use crate::{gcloud::GoogleCloudProvider, hurricane::HurricaneProvider};

/// Provider 操作可能產生的錯誤。
///
/// 每個變體都帶有 Provider 的短名稱，顯示時一律以 `<provider>: ` 開頭。
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 設定不完整或無效，在任何網路請求之前即被偵測。
    #[error("{provider}: {message}")]
    Configuration {
        provider: &'static str,
        message: String,
    },
    /// 無法取得或使用憑證。
    #[error("{provider}: {message}")]
    Authentication {
        provider: &'static str,
        message: String,
    },
    /// 傳輸層錯誤（連線失敗、逾時等），保留底層錯誤。
    #[error("{provider}: {context}: {source}")]
    Transport {
        provider: &'static str,
        context: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider}: {context}: unexpected status code: [status code: {}] body: {body}", .status.as_u16())]
    UnexpectedStatus {
        provider: &'static str,
        context: String,
        status: StatusCode,
        body: String,
    },
    /// Provider 回報的衝突，例如同一次變更中出現重複的值。
    #[error("{provider}: {context}: {message}")]
    Conflict {
        provider: &'static str,
        context: String,
        message: String,
    },
    /// 目標資源不存在；清除記錄時會被視為成功。
    #[error("{provider}: {context}: {message}")]
    NotFound {
        provider: &'static str,
        context: String,
        message: String,
    },
    #[error("{provider}: {message}")]
    ZoneNotFound {
        provider: &'static str,
        domain: String,
        message: String,
    },
    #[error("{provider}: domain {domain} not found in credentials, check your credentials map")]
    MissingToken {
        provider: &'static str,
        domain: String,
    },
    /// Provider 以非錯誤狀態碼回傳的失敗結果。
    #[error("{provider}: {message}")]
    Api {
        provider: &'static str,
        code: String,
        message: String,
    },
    #[error("{provider}: {context}: {source}")]
    Decode {
        provider: &'static str,
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ProviderError {
    pub fn config(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Configuration {
            provider,
            message: message.into(),
        }
    }

    pub fn auth(provider: &'static str, message: impl Into<String>) -> Self {
        Self::Authentication {
            provider,
            message: message.into(),
        }
    }

    /// 回傳產生此錯誤的 Provider 短名稱。
    pub fn provider(&self) -> &'static str {
        match self {
            Self::Configuration { provider, .. }
            | Self::Authentication { provider, .. }
            | Self::Transport { provider, .. }
            | Self::UnexpectedStatus { provider, .. }
            | Self::Conflict { provider, .. }
            | Self::NotFound { provider, .. }
            | Self::ZoneNotFound { provider, .. }
            | Self::MissingToken { provider, .. }
            | Self::Api { provider, .. }
            | Self::Decode { provider, .. } => provider,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// 自訂的傳播檢查參數。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    /// 等待 DNS 傳播的最長時間
    pub timeout: Duration,
    /// 兩次傳播檢查之間的間隔
    pub interval: Duration,
}

/// 調度器處理挑戰的方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 可與其他挑戰並行處理
    Parallel,
    /// 必須逐一處理，且每次之間至少間隔 `interval`
    Sequential { interval: Duration },
}

/// Provider 在建構時登記的可選能力。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// 覆寫全域預設值的傳播等待參數
    pub timeout: Option<Timeout>,
    /// 若存在，表示挑戰必須依序處理，值為最小間隔
    pub sequential: Option<Duration>,
}

impl Capabilities {
    pub fn resolution(&self) -> Resolution {
        match self.sequential {
            Some(interval) => Resolution::Sequential { interval },
            None => Resolution::Parallel,
        }
    }

    /// 取得傳播等待參數，Provider 未宣告時使用調度器的預設值。
    pub fn timeout_or(&self, default: Timeout) -> Timeout {
        self.timeout.unwrap_or(default)
    }
}

/// DNS-01 挑戰 Provider 必須實作的介面。
///
/// 實作必須可在多執行緒間共用；每次呼叫只是一段短暫的阻塞式 HTTP 請求序列。
pub trait ChallengeProvider: Send + Sync + fmt::Debug {
    /// Provider 的短名稱，例如 `googlecloud`、`hurricane`
    fn name(&self) -> &'static str;

    /// 建立（或更新）TXT 記錄以完成挑戰。
    fn present(&self, domain: &str, token: &str, key_auth: &str) -> Result<(), ProviderError>;

    /// 移除挑戰所建立的 TXT 值；記錄已不存在時視為成功。
    fn clean_up(&self, domain: &str, token: &str, key_auth: &str) -> Result<(), ProviderError>;

    fn capabilities(&self) -> Capabilities;
}

/// 依名稱從環境變數建立 Provider。
///
/// 支援 `gcloud`（別名 `googlecloud`）與 `hurricane`。
pub fn new_provider_by_name(name: &str) -> Result<Box<dyn ChallengeProvider>, ProviderError> {
    match name.to_lowercase().as_str() {
        "gcloud" | "googlecloud" => Ok(Box::new(GoogleCloudProvider::from_env()?)),
        "hurricane" => Ok(Box::new(HurricaneProvider::from_env()?)),
        unknown => Err(ProviderError::config(
            "acme",
            format!("unrecognized DNS provider: {}", unknown),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_is_provider_prefixed() {
        let err = ProviderError::config("hurricane", "credentials missing");
        assert_eq!(err.to_string(), "hurricane: credentials missing");
        assert_eq!(err.provider(), "hurricane");

        let err = ProviderError::MissingToken {
            provider: "hurricane",
            domain: "example.com".into(),
        };
        assert_eq!(
            err.to_string(),
            "hurricane: domain example.com not found in credentials, check your credentials map"
        );

        let err = ProviderError::UnexpectedStatus {
            provider: "googlecloud",
            context: "list managed zones".into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".into(),
        };
        assert_eq!(
            err.to_string(),
            "googlecloud: list managed zones: unexpected status code: [status code: 500] body: boom"
        );
    }

    #[test]
    fn test_error_kinds() {
        let not_found = ProviderError::NotFound {
            provider: "googlecloud",
            context: "apply change".into(),
            message: "zone gone".into(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_conflict());

        let conflict = ProviderError::Conflict {
            provider: "googlecloud",
            context: "apply change".into(),
            message: "already exists".into(),
        };
        assert!(conflict.is_conflict());
    }

    #[test]
    fn test_capabilities_resolution() {
        assert_eq!(Capabilities::default().resolution(), Resolution::Parallel);

        let sequential = Capabilities {
            timeout: None,
            sequential: Some(Duration::from_secs(60)),
        };
        assert_eq!(
            sequential.resolution(),
            Resolution::Sequential {
                interval: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn test_capabilities_timeout_or() {
        let default = Timeout {
            timeout: Duration::from_secs(60),
            interval: Duration::from_secs(2),
        };
        assert_eq!(Capabilities::default().timeout_or(default), default);

        let custom = Timeout {
            timeout: Duration::from_secs(300),
            interval: Duration::from_secs(5),
        };
        let caps = Capabilities {
            timeout: Some(custom),
            sequential: None,
        };
        assert_eq!(caps.timeout_or(default), custom);
    }

    #[test]
    fn test_unknown_provider_name() {
        let err = new_provider_by_name("route99").unwrap_err();
        assert_eq!(err.to_string(), "acme: unrecognized DNS provider: route99");
    }
}
