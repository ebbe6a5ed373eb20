//! 環境變數讀取工具。
//!
//! 所有 Provider 的設定皆透過 [`EnvSource`] 讀取，正式環境使用 [`ProcessEnv`]，
//! 測試時可直接以 `HashMap` 提供變數，避免修改行程的環境變數。

use std::{
    collections::{BTreeMap, HashMap},
    time::Duration,
};

use thiserror::Error;
use tracing::warn;

/// 讀取環境變數時可能發生的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("some credentials information are missing: {}", .0.join(","))]
    Missing(Vec<String>),
    #[error("incorrect pair: {0}")]
    IncorrectPair(String),
}

/// 環境變數來源。
///
/// 空字串視同未設定。
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// 讀取目前行程的環境變數。
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.is_empty()).cloned()
    }
}

impl EnvSource for HashMap<&str, &str> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
    }
}

/// 讀取所有必要的變數，任一缺少時回傳包含全部缺少名稱的 [`EnvError::Missing`]。
pub fn get_required(env: &dyn EnvSource, keys: &[&str]) -> Result<HashMap<String, String>, EnvError> {
    let mut values = HashMap::new();
    let mut missing = Vec::new();
    for key in keys {
        match env.var(key) {
            Some(value) => {
                values.insert(key.to_string(), value);
            }
            None => missing.push(key.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(EnvError::Missing(missing));
    }
    Ok(values)
}

/// 讀取以秒為單位的時間設定。
///
/// 未設定、無法解析或為零時回傳預設值，確保網路客戶端不會收到零值設定。
pub fn get_or_default_secs(env: &dyn EnvSource, key: &str, default: Duration) -> Duration {
    match env.var(key).map(|v| v.trim().parse::<u64>()) {
        Some(Ok(0)) | None => default,
        Some(Ok(secs)) => Duration::from_secs(secs),
        Some(Err(e)) => {
            warn!(key, error = %e, "Ignoring invalid duration, using default");
            default
        }
    }
}

pub fn get_or_default_u32(env: &dyn EnvSource, key: &str, default: u32) -> u32 {
    match env.var(key).map(|v| v.trim().parse::<u32>()) {
        Some(Ok(0)) | None => default,
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            warn!(key, error = %e, "Ignoring invalid number, using default");
            default
        }
    }
}

pub fn get_or_default_bool(env: &dyn EnvSource, key: &str, default: bool) -> bool {
    match env.var(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => default,
        Some(v) => match v.as_str() {
            "1" | "true" | "t" | "yes" => true,
            "0" | "false" | "f" | "no" => false,
            _ => {
                warn!(key, value = %v, "Ignoring invalid boolean, using default");
                default
            }
        },
    }
}

pub fn get_or_default_string(env: &dyn EnvSource, key: &str, default: &str) -> String {
    env.var(key).unwrap_or_else(|| default.to_owned())
}

/// 解析 `key:value,key:value` 格式的字串。
///
/// 值中可以包含 `:`，僅以第一個 `:` 分隔。
pub fn parse_pairs(raw: &str) -> Result<BTreeMap<String, String>, EnvError> {
    let mut pairs = BTreeMap::new();
    for item in raw.split(',') {
        let item = item.trim();
        match item.split_once(':') {
            Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
                pairs.insert(key.trim().to_string(), value.trim().to_string());
            }
            _ => return Err(EnvError::IncorrectPair(item.to_string())),
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_required_reports_every_missing_key() {
        let env = HashMap::from([("A", "1"), ("B", "")]);
        let err = get_required(&env, &["A", "B", "C"]).unwrap_err();
        assert_eq!(err, EnvError::Missing(vec!["B".into(), "C".into()]));
        assert_eq!(
            err.to_string(),
            "some credentials information are missing: B,C"
        );

        let values = get_required(&env, &["A"]).unwrap();
        assert_eq!(values["A"], "1");
    }

    #[test]
    fn test_get_or_default_secs() {
        let env = HashMap::from([("SET", "42"), ("ZERO", "0"), ("BAD", "soon")]);
        let default = Duration::from_secs(7);
        assert_eq!(get_or_default_secs(&env, "SET", default), Duration::from_secs(42));
        assert_eq!(get_or_default_secs(&env, "ZERO", default), default);
        assert_eq!(get_or_default_secs(&env, "BAD", default), default);
        assert_eq!(get_or_default_secs(&env, "UNSET", default), default);
    }

    #[test]
    fn test_get_or_default_bool_and_u32() {
        let env = HashMap::from([("YES", "true"), ("NO", "0"), ("TTL", "300"), ("JUNK", "maybe")]);
        assert!(get_or_default_bool(&env, "YES", false));
        assert!(!get_or_default_bool(&env, "NO", true));
        assert!(get_or_default_bool(&env, "JUNK", true));
        assert_eq!(get_or_default_u32(&env, "TTL", 120), 300);
        assert_eq!(get_or_default_u32(&env, "UNSET", 120), 120);
    }

    #[test]
    fn test_parse_pairs() {
        let pairs = parse_pairs("example.org:token1, example.com:tok:en2").unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs["example.org"], "token1");
        assert_eq!(pairs["example.com"], "tok:en2");
    }

    #[test]
    fn test_parse_pairs_rejects_malformed_items() {
        assert_eq!(
            parse_pairs("example.org:token1,example.com").unwrap_err(),
            EnvError::IncorrectPair("example.com".into())
        );
        assert_eq!(
            parse_pairs("example.org:").unwrap_err().to_string(),
            "incorrect pair: example.org:"
        );
    }
}
