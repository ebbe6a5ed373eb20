//! 阻塞式 HTTP 請求的共用處理流程。
//!
//! 各 Provider 自行組出 `RequestBuilder`（URL、標頭、內容），
//! 這裡只負責送出請求、記錄日誌與讀取回應，錯誤一律帶上 Provider 名稱。

use std::time::Duration;

use reqwest::{
    blocking::{Client, RequestBuilder},
    StatusCode,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::provider::ProviderError;

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// 建立帶有逾時設定的 HTTP 客戶端。
pub fn build_client(provider: &'static str, timeout: Duration) -> Result<Client, ProviderError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| ProviderError::config(provider, format!("unable to create HTTP client: {}", e)))
}

/// 送出請求並回傳狀態碼與回應內容，不檢查狀態碼。
pub fn execute(
    request: RequestBuilder,
    provider: &'static str,
    context: &str,
) -> Result<(StatusCode, String), ProviderError> {
    debug!(provider, context, "Sending request");

    let response = request.send().map_err(|source| ProviderError::Transport {
        provider,
        context: context.to_owned(),
        source,
    })?;
    let status = response.status();
    let body = response.text().map_err(|source| ProviderError::Transport {
        provider,
        context: context.to_owned(),
        source,
    })?;

    debug!(provider, context, status = status.as_u16(), "Received response");
    Ok((status, body))
}

/// 解析 JSON 回應內容。
pub fn parse_json<T: DeserializeOwned>(
    body: &str,
    provider: &'static str,
    context: &str,
) -> Result<T, ProviderError> {
    serde_json::from_str(body).map_err(|source| ProviderError::Decode {
        provider,
        context: context.to_owned(),
        source,
    })
}
