use openssl::base64::encode_block;

/// 提供 Base64 編碼的結構體，底層使用 OpenSSL 的標準 Base64 編碼。
///
/// DNS-01 的 TXT 記錄值與 JWT 的各個區段都需要 URL 安全且無填充的格式，
/// 可透過 [`Base64::base64_url`] 取得。
///
/// # 示例
///
/// ```
/// # use racme_dns::base64::Base64;
/// let b64 = Base64::new("Hello, World!");
/// assert_eq!(b64.as_str(), "SGVsbG8sIFdvcmxkIQ==");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Base64 {
    encoded: String,
}

impl Base64 {
    /// 根據輸入數據生成標準 Base64 編碼。
    ///
    /// 接受任何可轉換為字節切片的類型（例如 `&str` 或 `Vec<u8>`）。
    pub fn new<T: AsRef<[u8]>>(input: T) -> Self {
        Self {
            encoded: encode_block(input.as_ref()),
        }
    }

    /// 將標準 Base64 編碼轉換為 URL 安全的 Base64 字符串。
    ///
    /// 轉換規則為：
    /// - 將 `+` 替換為 `-`
    /// - 將 `/` 替換為 `_`
    /// - 移除填充符號 `=`
    pub fn base64_url(&self) -> String {
        self.encoded
            .replace('+', "-")
            .replace('/', "_")
            .replace('=', "")
    }

    /// 返回內部存儲的標準 Base64 編碼字符串的引用。
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}
