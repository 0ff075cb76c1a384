//! CloudAPI client

use async_trait::async_trait;
use reaper_cloud_api::{CloudGateway, GatewayError, GatewayResult, Machine, TagSet};
use reaper_config::ReaperConfig;
use reaper_util::{MachineId, now_utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, DATE};
use reqwest::{Client, Method, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

use crate::{DeletionRequest, RequestSigner, TritonError, http_date};

/// CloudAPI version range requested on every call
pub const API_VERSION: &str = "~7.2";

/// Per-request timeout
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Machines requested per `ListMachines` page (the CloudAPI maximum)
pub const LIST_PAGE_SIZE: usize = 1000;

/// Gateway backed by a Triton CloudAPI endpoint
pub struct TritonGateway {
    client: Client,
    base_url: Url,
    account: String,
    signer: RequestSigner,
    notify_url: Option<String>,
}

impl TritonGateway {
    /// Create a gateway, loading the account key from `config.cloud.key_path`
    pub fn new(config: &ReaperConfig) -> Result<Self, TritonError> {
        let cloud = &config.cloud;
        let base_url = Url::parse(&cloud.sdc_url).map_err(|e| TritonError::InvalidUrl {
            url: cloud.sdc_url.clone(),
            message: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(TritonError::InvalidUrl {
                url: cloud.sdc_url.clone(),
                message: "not a hierarchical URL".into(),
            });
        }

        let signer = RequestSigner::from_key_file(&cloud.account, &cloud.key_id, &cloud.key_path)?;

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .user_agent(cloud.user_agent.clone())
            .build()?;

        info!(
            sdc_url = %cloud.sdc_url,
            account = %cloud.account,
            key_id = %signer.key_id(),
            "CloudAPI gateway ready"
        );

        Ok(Self {
            client,
            base_url,
            account: cloud.account.clone(),
            signer,
            notify_url: config.notify_url.clone(),
        })
    }

    /// `{sdc_url}/{account}/{segments...}?{query}`, each segment percent-encoded
    fn url(&self, segments: &[&str], query: &[(&str, &str)]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(&self.account).extend(segments);
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        url
    }

    /// Send a signed request and check its status
    async fn send(&self, method: Method, url: Url) -> GatewayResult<Response> {
        let date = http_date(now_utc());

        debug!(method = %method, url = %url, "CloudAPI request");

        let response = self
            .client
            .request(method, url)
            .header(DATE, &date)
            .header(AUTHORIZATION, self.signer.sign_date(&date))
            .header(ACCEPT, "application/json")
            .header("X-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(transport)?;

        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> GatewayResult<T> {
        let response = self.send(Method::GET, url).await?;
        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|e| GatewayError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl CloudGateway for TritonGateway {
    async fn list_machines(&self) -> GatewayResult<Vec<Machine>> {
        let limit = LIST_PAGE_SIZE.to_string();
        collect_pages(LIST_PAGE_SIZE, move |offset| {
            let offset = offset.to_string();
            let url = self.url(&["machines"], &[("limit", &limit), ("offset", &offset)]);
            self.get_json::<Vec<Machine>>(url)
        })
        .await
    }

    async fn get_machine(&self, id: &MachineId) -> GatewayResult<Machine> {
        self.get_json(self.url(&["machines", id.as_str()], &[]))
            .await
    }

    async fn list_machine_tags(&self, id: &MachineId) -> GatewayResult<TagSet> {
        let raw: serde_json::Map<String, Value> = self
            .get_json(self.url(&["machines", id.as_str(), "tags"], &[]))
            .await?;
        Ok(tags_from_json(raw))
    }

    async fn stop_machine(&self, id: &MachineId) -> GatewayResult<()> {
        let url = self.url(&["machines", id.as_str()], &[("action", "stop")]);
        self.send(Method::POST, url).await?;
        Ok(())
    }

    async fn delete_machine(&self, id: &MachineId) -> GatewayResult<()> {
        let url = self.url(&["machines", id.as_str()], &[]);
        self.send(Method::DELETE, url).await?;
        Ok(())
    }

    async fn request_deletion(
        &self,
        batch: &[Machine],
        notify_address: &str,
    ) -> GatewayResult<()> {
        let Some(notify_url) = &self.notify_url else {
            return Err(GatewayError::NotConfigured(
                "notify_url is required to request manual deletion".into(),
            ));
        };

        let body = DeletionRequest::new(&self.account, notify_address, batch, now_utc());
        debug!(url = %notify_url, count = body.machines.len(), "Posting deletion request");

        let response = self
            .client
            .post(notify_url)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;

        check_status(response).await?;
        Ok(())
    }
}

/// Fetch pages at increasing offsets until one comes back short
async fn collect_pages<F, Fut>(page_size: usize, mut fetch: F) -> GatewayResult<Vec<Machine>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = GatewayResult<Vec<Machine>>>,
{
    let mut machines = Vec::new();
    loop {
        let page = fetch(machines.len()).await?;
        let len = page.len();
        machines.extend(page);

        if len < page_size {
            return Ok(machines);
        }
        debug!(fetched = machines.len(), "Fetching next page of machines");
    }
}

fn transport(e: reqwest::Error) -> GatewayError {
    GatewayError::Transport(e.to_string())
}

async fn check_status(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    // Body is only used for the message; a read failure is not worth reporting
    let body = response.text().await.unwrap_or_default();
    Err(map_status(status.as_u16(), error_message(&body)))
}

/// Classify a non-2xx CloudAPI response
pub fn map_status(status: u16, message: String) -> GatewayError {
    match status {
        401 | 403 => GatewayError::Auth(message),
        404 => GatewayError::NotFound(message),
        429 => GatewayError::RateLimited,
        _ => GatewayError::Api { status, message },
    }
}

/// CloudAPI errors look like `{"code": "...", "message": "..."}`; fall back to the raw body
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Tag values may be strings, booleans or numbers; keep their text form
fn tags_from_json(raw: serde_json::Map<String, Value>) -> TagSet {
    raw.into_iter()
        .map(|(name, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (name, value)
        })
        .collect()
}
