//! 服務帳戶 OAuth2 授權所需的 JWT 簽署（RS256）。
//!
//! 產生 `header.claims.signature` 形式的 compact JWT，各區段皆為 URL 安全且無填充的 Base64。

use openssl::{
    error::ErrorStack,
    hash::MessageDigest,
    pkey::{Id, PKey, Private},
    sign::Signer,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::base64::Base64;

/// JWT 簽署過程中的錯誤。
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("OpenSSL error: {0}")]
    OpenSSL(#[from] ErrorStack),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// 服務帳戶金鑰必須是 RSA 私鑰
    #[error("unsupported private key type, expected RSA")]
    UnsupportedKey,
}

type Result<T> = std::result::Result<T, JwtError>;

const ALGORITHM: &str = "RS256";

#[derive(Debug, Serialize)]
struct Header<'a> {
    alg: &'static str,
    typ: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kid: Option<&'a str>,
}

/// JWT bearer grant 的聲明內容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// 服務帳戶的電子郵件
    pub iss: String,
    /// 以空白分隔的授權範圍
    pub scope: String,
    /// token 端點
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

/// 以 RSA 私鑰簽署 JWT。
#[derive(Debug)]
pub struct RsaSigner {
    key: PKey<Private>,
    key_id: Option<String>,
}

impl RsaSigner {
    /// 從 PEM 格式（PKCS#8 或 PKCS#1）的私鑰建立簽署器。
    pub fn from_pem(pem: &[u8], key_id: Option<String>) -> Result<Self> {
        let key = PKey::private_key_from_pem(pem)?;
        if key.id() != Id::RSA {
            return Err(JwtError::UnsupportedKey);
        }
        Ok(Self { key, key_id })
    }

    /// 簽署聲明並回傳 compact 形式的 JWT。
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        let header = Header {
            alg: ALGORITHM,
            typ: "JWT",
            kid: self.key_id.as_deref(),
        };
        let header_b64 = Base64::new(serde_json::to_vec(&header)?).base64_url();
        let claims_b64 = Base64::new(serde_json::to_vec(claims)?).base64_url();
        let signing_input = format!("{}.{}", header_b64, claims_b64);

        let mut signer = Signer::new(MessageDigest::sha256(), &self.key)?;
        signer.update(signing_input.as_bytes())?;
        let signature = signer.sign_to_vec()?;

        Ok(format!("{}.{}", signing_input, Base64::new(signature).base64_url()))
    }
}
