//! DNS-01 挑戰資訊的計算。
//!
//! 依據網域與 key authorization 推導出 TXT 記錄的完整名稱（FQDN）以及記錄值，
//! 兩個 Provider 皆透過 [`ChallengeInfo::new`] 取得一致的結果。

use openssl::sha::sha256;

use crate::base64::Base64;

/// DNS-01 挑戰記錄的名稱前綴。
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// 一次 DNS-01 挑戰所需的記錄資訊，每次呼叫時重新計算，建立後不可變。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeInfo {
    /// 去除萬用字元後的網域（不含結尾的點）
    pub domain: String,
    /// TXT 記錄的完整名稱，例如 `_acme-challenge.example.com.`
    pub effective_fqdn: String,
    /// TXT 記錄值，即 key authorization 的 SHA-256 摘要（URL 安全 Base64，無填充）
    pub value: String,
}

impl ChallengeInfo {
    /// 根據網域與 key authorization 建立挑戰資訊。
    ///
    /// 萬用字元網域（`*.example.com`）會使用其基底網域，名稱一律轉為小寫。
    pub fn new(domain: &str, key_auth: &str) -> Self {
        let domain = un_fqdn(normalize_domain(domain)).to_ascii_lowercase();
        let effective_fqdn = to_fqdn(&format!("{}.{}", ACME_CHALLENGE_LABEL, domain));

        Self {
            domain,
            effective_fqdn,
            value: txt_value(key_auth),
        }
    }
}

/// 計算 DNS-01 的 TXT 記錄值。
pub fn txt_value(key_auth: &str) -> String {
    Base64::new(sha256(key_auth.as_bytes())).base64_url()
}

/// 移除萬用字元前綴，`*.example.com` 會回傳 `example.com`。
pub fn normalize_domain(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// 確保名稱以 `.` 結尾。
pub fn to_fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_owned()
    } else {
        format!("{}.", name)
    }
}

/// 移除名稱結尾的 `.`。
pub fn un_fqdn(name: &str) -> &str {
    name.strip_suffix('.').unwrap_or(name)
}

/// 由長至短列出名稱的所有後綴（皆為 FQDN 形式），用於尋找權威 zone。
///
/// `sub.example.com` 會依序產生 `sub.example.com.`、`example.com.`、`com.`。
pub fn domain_suffixes(name: &str) -> Vec<String> {
    let name = un_fqdn(name);
    let mut suffixes = Vec::new();
    let mut current = name;
    while !current.is_empty() {
        suffixes.push(to_fqdn(current));
        match current.find('.') {
            Some(pos) => current = &current[pos + 1..],
            None => break,
        }
    }
    suffixes
}
