//! Cloud DNS v1 REST API 使用的資料結構，欄位名稱採 camelCase。

use serde::{Deserialize, Serialize};

pub const RECORD_TYPE_TXT: &str = "TXT";

/// 變更已送出但尚未套用完成時的狀態值。
pub const CHANGE_STATUS_PENDING: &str = "pending";

/// Cloud DNS 中的託管 zone。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedZone {
    pub name: String,
    #[serde(default)]
    pub dns_name: String,
    /// `public`、`private`，舊版 API 可能為空字串
    #[serde(default)]
    pub visibility: String,
}

impl ManagedZone {
    pub fn is_public(&self) -> bool {
        self.visibility.is_empty() || self.visibility.eq_ignore_ascii_case("public")
    }
}

/// 同名同類型的一組記錄。TXT 記錄的 `rrdatas` 在傳輸時帶有雙引號。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecordSet {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub ttl: u32,
    #[serde(default)]
    pub rrdatas: Vec<String>,
}

impl ResourceRecordSet {
    pub fn txt(name: impl Into<String>, ttl: u32, rrdatas: Vec<String>) -> Self {
        Self {
            name: name.into(),
            record_type: RECORD_TYPE_TXT.to_owned(),
            ttl,
            rrdatas,
        }
    }

    /// 解開引號後的所有 TXT 值。
    pub fn txt_values(&self) -> impl Iterator<Item = String> + '_ {
        self.rrdatas.iter().map(|data| unquote_txt(data))
    }
}

/// 一次原子性的記錄變更，先刪除 `deletions` 再新增 `additions`。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additions: Vec<ResourceRecordSet>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deletions: Vec<ResourceRecordSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl Change {
    pub fn is_pending(&self) -> bool {
        self.status.as_deref() == Some(CHANGE_STATUS_PENDING)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedZonesListResponse {
    #[serde(default)]
    pub managed_zones: Vec<ManagedZone>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecordSetsListResponse {
    #[serde(default)]
    pub rrsets: Vec<ResourceRecordSet>,
    pub next_page_token: Option<String>,
}

/// Google API 的錯誤回應外層。
#[derive(Debug, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
}

/// 以雙引號包住 TXT 值。
pub fn quote_txt(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// 解開 TXT 記錄的引號。
///
/// 長記錄會被拆成多段 `"a" "b"`，各段會依序串接；沒有引號的值原樣回傳。
pub fn unquote_txt(data: &str) -> String {
    let data = data.trim();
    if !data.starts_with('"') {
        return data.to_owned();
    }

    let mut value = String::with_capacity(data.len());
    let mut in_quotes = false;
    let mut chars = data.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    value.push(escaped);
                }
            }
            c if in_quotes => value.push(c),
            _ => {}
        }
    }
    value
}
