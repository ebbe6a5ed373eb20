use reqwest::{
    blocking::{Client as HttpClient, RequestBuilder},
    StatusCode,
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{
    token::TokenSource,
    types::{
        Change, ErrorEnvelope, ManagedZone, ManagedZonesListResponse, ResourceRecordSet,
        ResourceRecordSetsListResponse, RECORD_TYPE_TXT,
    },
    PROVIDER_NAME,
};
use crate::{http, provider::ProviderError};

/// Cloud DNS v1 REST API 的預設位址。
pub const DEFAULT_BASE_URL: &str = "https://dns.googleapis.com/dns/v1/";

/// Cloud DNS API 的客戶端，所有請求都以 Bearer 權杖授權。
#[derive(Debug)]
pub struct Client {
    http: HttpClient,
    base_url: String,
    project: String,
    tokens: Box<dyn TokenSource>,
}

impl Client {
    pub fn new(
        http: HttpClient,
        base_url: impl Into<String>,
        project: impl Into<String>,
        tokens: Box<dyn TokenSource>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            project: project.into(),
            tokens,
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// 列出 `dnsName` 等於 `dns_name` 的託管 zone，會自動取得所有分頁。
    pub fn list_managed_zones(&self, dns_name: &str) -> Result<Vec<ManagedZone>, ProviderError> {
        let context = format!("list managed zones for {}", dns_name);
        let url = self.endpoint("managedZones");

        let mut zones = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.http.get(&url).query(&[("dnsName", dns_name)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: ManagedZonesListResponse = self.send(request, &context)?;
            zones.extend(page.managed_zones);

            match next_page(page_token.as_deref(), page.next_page_token, &context) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(zones)
    }

    /// 列出 zone 中名稱為 `fqdn` 的 TXT 記錄集。
    pub fn list_txt_records(
        &self,
        zone: &str,
        fqdn: &str,
    ) -> Result<Vec<ResourceRecordSet>, ProviderError> {
        let context = format!("list TXT records {} in zone {}", fqdn, zone);
        let url = self.endpoint(&format!("managedZones/{}/rrsets", zone));

        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self
                .http
                .get(&url)
                .query(&[("name", fqdn), ("type", RECORD_TYPE_TXT)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: ResourceRecordSetsListResponse = self.send(request, &context)?;
            records.extend(
                page.rrsets
                    .into_iter()
                    .filter(|rrs| rrs.record_type.eq_ignore_ascii_case(RECORD_TYPE_TXT)),
            );

            match next_page(page_token.as_deref(), page.next_page_token, &context) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(records)
    }

    /// 送出一次記錄變更。
    pub fn create_change(&self, zone: &str, change: &Change) -> Result<Change, ProviderError> {
        let context = format!("apply change in zone {}", zone);
        let url = self.endpoint(&format!("managedZones/{}/changes", zone));
        let request = self.http.post(&url).json(change);
        self.send(request, &context)
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/projects/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.project,
            path
        )
    }

    fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        context: &str,
    ) -> Result<T, ProviderError> {
        let token = self.tokens.token()?;
        let request = request
            .bearer_auth(&token.token)
            .query(&[("prettyPrint", "false"), ("alt", "json")]);

        let (status, body) = http::execute(request, PROVIDER_NAME, context)?;
        if !status.is_success() {
            return Err(Self::status_error(context, status, &body));
        }

        debug!(project = %self.project, context, "Cloud DNS request succeeded");
        http::parse_json(&body, PROVIDER_NAME, context)
    }

    /// 將非 2xx 回應轉換為錯誤，回應為 Google 錯誤格式時取出其中的訊息。
    fn status_error(context: &str, status: StatusCode, body: &str) -> ProviderError {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| body.trim().to_owned());

        match status {
            StatusCode::NOT_FOUND => ProviderError::NotFound {
                provider: PROVIDER_NAME,
                context: context.to_owned(),
                message,
            },
            StatusCode::CONFLICT => ProviderError::Conflict {
                provider: PROVIDER_NAME,
                context: context.to_owned(),
                message,
            },
            _ => ProviderError::UnexpectedStatus {
                provider: PROVIDER_NAME,
                context: context.to_owned(),
                status,
                body: message,
            },
        }
    }
}

/// 取得下一頁的 token；伺服器重複回傳同一個 token 時停止翻頁。
fn next_page(current: Option<&str>, next: Option<String>, context: &str) -> Option<String> {
    let next = next.filter(|t| !t.is_empty())?;
    if current == Some(next.as_str()) {
        warn!(context, page_token = %next, "Server repeated the page token, stopping pagination");
        return None;
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcloud::token::StaticTokenSource;

    #[test]
    fn test_endpoint() {
        let client = Client::new(
            HttpClient::new(),
            DEFAULT_BASE_URL,
            "manhattan",
            Box::new(StaticTokenSource::new("t")),
        );
        assert_eq!(client.project(), "manhattan");
        assert_eq!(
            client.endpoint("managedZones/test/rrsets"),
            "https://dns.googleapis.com/dns/v1/projects/manhattan/managedZones/test/rrsets"
        );
    }

    #[test]
    fn test_next_page() {
        assert_eq!(next_page(None, None, "list"), None);
        assert_eq!(next_page(None, Some(String::new()), "list"), None);
        assert_eq!(
            next_page(None, Some("p1".into()), "list").as_deref(),
            Some("p1")
        );
        assert_eq!(
            next_page(Some("p1"), Some("p2".into()), "list").as_deref(),
            Some("p2")
        );
        assert_eq!(next_page(Some("p1"), Some("p1".into()), "list"), None);
    }

    #[test]
    fn test_status_error_unwraps_google_envelope() {
        let body = r#"{"error":{"code":404,"message":"The 'parameters.managedZone' resource named 'test' does not exist.","errors":[]}}"#;
        let err = Client::status_error("apply change in zone test", StatusCode::NOT_FOUND, body);
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "googlecloud: apply change in zone test: The 'parameters.managedZone' resource named 'test' does not exist."
        );
    }

    #[test]
    fn test_status_error_plain_text() {
        let err = Client::status_error(
            "apply change in zone test",
            StatusCode::CONFLICT,
            "The resource \"x\" already exists\n",
        );
        assert!(err.is_conflict());

        let err = Client::status_error("list managed zones", StatusCode::FORBIDDEN, "denied");
        assert_eq!(
            err.to_string(),
            "googlecloud: list managed zones: unexpected status code: [status code: 403] body: denied"
        );
    }
}
