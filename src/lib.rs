//! # ACME DNS-01 Provider Library
//!
//! 本庫提供 ACME DNS-01 挑戰所需的 DNS Provider 轉接層，由外部的調度器（挑戰狀態機、
//! 傳播檢查、重試）呼叫，負責在 DNS 服務商上建立與移除 `_acme-challenge` TXT 記錄：
//!
//! - **gcloud**: Google Cloud DNS，TXT 記錄集可同時保存多個挑戰值，新值會與既有值合併。
//! - **hurricane**: Hurricane Electric 動態 DNS，每個主機只有一個值，直接覆寫。
//!
//! 兩個 Provider 都實作 [`ChallengeProvider`]，並透過 [`Capabilities`] 告知調度器
//! 傳播等待時間以及是否必須依序處理挑戰。
//!
//! ## 使用方式
//!
//! ```no_run
//! use racme_dns::{new_provider_by_name, ChallengeProvider, Resolution};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // 依 HURRICANE_TOKENS 等環境變數建立 Provider
//!     let provider = new_provider_by_name("hurricane")?;
//!
//!     provider.present("example.com", "token", "token.thumbprint")?;
//!
//!     if let Resolution::Sequential { interval } = provider.capabilities().resolution() {
//!         println!("wait {:?} before the next challenge", interval);
//!     }
//!
//!     provider.clean_up("example.com", "token", "token.thumbprint")?;
//!     Ok(())
//! }
//! ```
//!
//! 所有請求皆為阻塞式，日誌透過 `tracing` 輸出，本庫不會安裝 subscriber。

pub mod base64;
pub mod challenge;
pub mod env;
pub mod gcloud;
mod http;
pub mod hurricane;
pub mod provider;

pub use challenge::ChallengeInfo;
pub use gcloud::GoogleCloudProvider;
pub use hurricane::HurricaneProvider;
pub use provider::{
    new_provider_by_name, Capabilities, ChallengeProvider, ProviderError, Resolution, Timeout,
};
