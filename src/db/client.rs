use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};
use url::Url;

use super::delete_flow::{DeleteStage, StepResult};
use super::store::{DeleteOutcome, EntryStore, Referrer, StoreError};
use crate::core::config::StackConfig;
use crate::core::entry::{EntryRef, INLINE_ENTRY_FIELD, UID_FIELD};
use crate::utils::truncate_with_ellipsis;


const MAX_ERROR_BODY_CHARS: usize = 300;


/// Management API client for one content stack environment.
pub struct ContentstackClient {
    http: Client,
    base_url: String,
    api_key: String,
    management_token: String,
    auth_token: Option<String>,
    environment_uid: Option<String>,
    locale: String,
    max_retries: u32,
    retry_delay: Duration,
    rate_limit_delay: Duration,
}

impl ContentstackClient {
    pub fn new(config: &StackConfig) -> Result<Self, StoreError> {
        if config.base_url.trim().is_empty() {
            return Err(StoreError::InvalidConfig(
                "base_url is required and cannot be empty".to_string(),
            ));
        }
        Url::parse(&config.base_url)
            .map_err(|e| StoreError::InvalidConfig(format!("invalid base_url {}: {}", config.base_url, e)))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        info!("ContentstackClient created for {} ({})", config.base_url, config.environment);

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            management_token: config.management_token.clone(),
            auth_token: config.auth_token.clone(),
            environment_uid: config.environment_uid.clone(),
            locale: config.locale.clone(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            rate_limit_delay: Duration::from_millis(config.rate_limit_delay_ms),
        })
    }

    fn entries_url(&self, content_type_uid: &str) -> String {
        format!("{}/content_types/{}/entries", self.base_url, content_type_uid)
    }

    fn entry_url(&self, entry: &EntryRef) -> String {
        format!("{}/{}", self.entries_url(&entry.content_type_uid), entry.entry_uid)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("api_key", &self.api_key)
            .header("authorization", &self.management_token)
            .query(&[("locale", self.locale.as_str())])
    }

    /// Sends with bounded retries on network errors, 429 and 5xx. Other
    /// statuses come back as `StoreError::Status` without retrying.
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        query: &[(&str, String)],
    ) -> Result<Value, StoreError> {
        let attempts = self.max_retries + 1;
        let mut last_error = None;

        for attempt in 1..=attempts {
            tokio::time::sleep(self.rate_limit_delay).await;
            debug!("{} {} (attempt {})", method, url, attempt);

            let mut builder = self.request(method.clone(), url).query(query);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            match builder.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let text = response.text().await?;
                        if text.trim().is_empty() {
                            return Ok(Value::Object(Default::default()));
                        }
                        return Ok(serde_json::from_str(&text)?);
                    }

                    let message = response.text().await.unwrap_or_default();
                    let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !retryable {
                        return Err(StoreError::Status {
                            status: status.as_u16(),
                            message: truncate_with_ellipsis(&message, MAX_ERROR_BODY_CHARS),
                        });
                    }

                    warn!("{} {} returned {} (attempt {}/{})", method, url, status, attempt, attempts);
                    last_error = Some(format!("HTTP {}: {}", status, truncate_with_ellipsis(&message, MAX_ERROR_BODY_CHARS)));
                }
                Err(e) => {
                    warn!("{} {} failed (attempt {}/{}): {}", method, url, attempt, attempts, e);
                    last_error = Some(e.to_string());
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.retry_delay * attempt).await;
            }
        }

        Err(StoreError::RetryExhausted(
            attempts,
            last_error.unwrap_or_else(|| "Unknown error".to_string()),
        ))
    }

    /// One attempt, folded into a delete-flow step result.
    async fn step(&self, builder: RequestBuilder) -> StepResult {
        match builder.send().await {
            Ok(response) if response.status().is_success() => StepResult::Success,
            Ok(response) => {
                let status = response.status().as_u16();
                let message = response.text().await.unwrap_or_default();
                StepResult::Status {
                    status,
                    message: format!("HTTP {}: {}", status, truncate_with_ellipsis(&message, MAX_ERROR_BODY_CHARS)),
                }
            }
            Err(e) => StepResult::Transport(e.to_string()),
        }
    }

    async fn unpublish(&self, entry: &EntryRef) -> StepResult {
        let url = format!("{}/unpublish", self.entry_url(entry));
        let payload = json!({
            "entry": {
                "locales": [self.locale],
                "environments": self.environment_uid.iter().collect::<Vec<_>>(),
            }
        });

        // unpublish needs a user auth token when one is configured
        let builder = match &self.auth_token {
            Some(token) => self
                .http
                .post(&url)
                .header("api_key", &self.api_key)
                .header("authtoken", token)
                .query(&[("locale", self.locale.as_str())])
                .json(&payload),
            None => self.request(Method::POST, &url).json(&payload),
        };

        self.step(builder).await
    }

    async fn clear_workflow(&self, entry: &EntryRef) -> StepResult {
        let url = format!("{}/workflow", self.entry_url(entry));
        self.step(self.request(Method::DELETE, &url)).await
    }
}

#[async_trait]
impl EntryStore for ContentstackClient {
    async fn fetch_entry(&self, entry: &EntryRef) -> Result<Option<Value>, StoreError> {
        debug!("Getting entry: {}", entry);
        match self.execute(Method::GET, &self.entry_url(entry), None, &[]).await {
            Ok(mut response) => Ok(response
                .get_mut(INLINE_ENTRY_FIELD)
                .map(Value::take)
                .filter(|body| !body.is_null())),
            Err(e) if e.is_not_found() => {
                debug!("Entry {} not found", entry);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn delete_entry(&self, entry: &EntryRef) -> Result<DeleteOutcome, StoreError> {
        info!("Deleting entry: {}", entry);
        tokio::time::sleep(self.rate_limit_delay).await;

        let url = self.entry_url(entry);
        let mut stage = DeleteStage::start();

        loop {
            let delay = stage.settle_delay(self.retry_delay);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let result = match &stage {
                DeleteStage::Deleting { attempt } => {
                    if *attempt > 1 {
                        warn!("Retrying delete of {} (attempt {}/{})", entry, attempt, self.max_retries + 1);
                    }
                    self.step(self.request(Method::DELETE, &url)).await
                }
                DeleteStage::Retrying => self.step(self.request(Method::DELETE, &url)).await,
                DeleteStage::Unpublishing => {
                    warn!("Entry deletion blocked (422) for {}, attempting unpublish", entry);
                    self.unpublish(entry).await
                }
                DeleteStage::ClearingWorkflow => self.clear_workflow(entry).await,
                DeleteStage::Done(outcome) => {
                    match outcome {
                        DeleteOutcome::Deleted => info!("Entry {} deleted", entry),
                        DeleteOutcome::AlreadyDeleted => info!("Entry {} not found (404) - already deleted", entry),
                        DeleteOutcome::Protected => {
                            warn!("Could not delete {} after unpublish/workflow removal", entry)
                        }
                        DeleteOutcome::Failed(message) => error!("Error deleting {}: {}", entry, message),
                    }
                    return Ok(outcome.clone());
                }
            };

            debug!("Delete flow for {}: {:?} -> {:?}", entry, stage, result);
            stage = stage.next(result, self.max_retries);
        }
    }

    async fn list_referrers(&self, entry: &EntryRef) -> Result<Vec<Referrer>, StoreError> {
        let url = format!("{}/references", self.entry_url(entry));
        let response = self.execute(Method::GET, &url, None, &[]).await?;

        let references = response
            .get("references")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        debug!("Entry {} has {} referrers", entry, references.len());
        Ok(references.into_iter().map(Referrer).collect())
    }

    async fn create_entry(&self, content_type_uid: &str, body: &Value) -> Result<EntryRef, StoreError> {
        info!("Creating entry for content type: {}", content_type_uid);
        let payload = json!({ "entry": body });
        let response = self
            .execute(Method::POST, &self.entries_url(content_type_uid), Some(&payload), &[])
            .await?;

        let uid = response
            .get(INLINE_ENTRY_FIELD)
            .and_then(|entry| entry.get(UID_FIELD))
            .and_then(Value::as_str)
            .ok_or_else(|| StoreError::UnexpectedResponse("created entry has no uid".to_string()))?;

        info!("Entry created with uid {}", uid);
        Ok(EntryRef::new(content_type_uid, uid))
    }

    async fn find_entry_by_title(
        &self,
        content_type_uid: &str,
        title: &str,
    ) -> Result<Option<EntryRef>, StoreError> {
        let query = json!({ "title": title }).to_string();
        let response = self
            .execute(Method::GET, &self.entries_url(content_type_uid), None, &[("query", query)])
            .await?;

        let found = response
            .get("entries")
            .and_then(Value::as_array)
            .and_then(|entries| entries.first())
            .and_then(|entry| entry.get(UID_FIELD))
            .and_then(Value::as_str)
            .map(|uid| EntryRef::new(content_type_uid, uid));

        Ok(found)
    }
}
