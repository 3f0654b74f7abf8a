use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::api::TimeTrackingApi;
use crate::config::Settings;
use crate::error::ClockodoError;
use crate::models::{
    ClockResponse, Customer, CustomerId, CustomersResponse, EntriesResponse, EntryId,
    EntryResponse, NewEntry, Project, ProjectsResponse, Service, ServicesResponse, StartClock,
    StopClockResponse, TimeEntry, User, UsersResponse,
};
use crate::retry::{RetryPolicy, RetryState, next_delay};

// Upper bound on followed pages for a single listing.
const MAX_PAGES: u32 = 100;

#[derive(Clone)]
pub struct ClockodoClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl ClockodoClient {
    pub fn new(settings: &Settings) -> Result<Self, ClockodoError> {
        let mut headers = HeaderMap::new();
        headers.insert("X-ClockodoApiUser", header_value(&settings.credentials.email)?);
        headers.insert("X-ClockodoApiKey", header_value(&settings.credentials.api_key)?);
        headers.insert(
            "X-Clockodo-External-Application",
            header_value(&settings.external_application)?,
        );
        headers.insert("Accept", HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent("clockodo-mcp")
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ClockodoError::Transport(err.to_string()))?;

        Ok(Self {
            client,
            base_url: settings.base_url.clone(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sends one logical request, retrying transient failures per the
    /// configured policy, and decodes the JSON response into `T`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, ClockodoError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut state = RetryState::default();
        let mut attempt = 1;
        loop {
            match self.send_once(method.clone(), path, query, body).await {
                Ok(value) => return Ok(value),
                Err(err) => match next_delay(&self.retry, &err, &mut state) {
                    Some(delay) => {
                        warn!(
                            method = %method,
                            path,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Retrying Clockodo request"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        error!(
                            method = %method,
                            path,
                            attempt,
                            kind = err.kind().as_str(),
                            error = %err,
                            "Clockodo request failed"
                        );
                        return Err(err);
                    }
                },
            }
        }
    }

    async fn send_once<T, B>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T, ClockodoError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let base = format!("{}{}", self.base_url, path);
        let parsed = if query.is_empty() {
            reqwest::Url::parse(&base)
        } else {
            reqwest::Url::parse_with_params(&base, query.iter().map(|(key, value)| (*key, value.as_str())))
        };
        let url = parsed.map_err(|err| ClockodoError::Transport(err.to_string()))?;

        debug!(method = %method, path, has_body = body.is_some(), "Sending request to Clockodo");

        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|err| ClockodoError::Transport(err.to_string()))?;

        let status = response.status();
        debug!(method = %method, path, status = status.as_u16(), "Received response from Clockodo");

        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| ClockodoError::Transport(format!("malformed response: {err}")));
        }

        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, &body, retry_after))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ClockodoError> {
        self.request::<T, ()>(Method::GET, path, query, None).await
    }
}

#[async_trait]
impl TimeTrackingApi for ClockodoClient {
    async fn list_customers(&self) -> Result<Vec<Customer>, ClockodoError> {
        let response: CustomersResponse = self.get("/customers", &[]).await?;
        Ok(response.customers)
    }

    async fn list_projects(&self, customer_id: Option<CustomerId>) -> Result<Vec<Project>, ClockodoError> {
        let query: Vec<(&str, String)> = customer_id
            .map(|id| vec![("customers_id", id.to_string())])
            .unwrap_or_default();
        let response: ProjectsResponse = self.get("/projects", &query).await?;
        Ok(response.projects)
    }

    async fn list_services(&self) -> Result<Vec<Service>, ClockodoError> {
        let response: ServicesResponse = self.get("/services", &[]).await?;
        Ok(response.services)
    }

    async fn list_users(&self) -> Result<Vec<User>, ClockodoError> {
        let response: UsersResponse = self.get("/users", &[]).await?;
        Ok(response.users)
    }

    async fn running_entry(&self) -> Result<Option<TimeEntry>, ClockodoError> {
        let response: ClockResponse = self.get("/clock", &[]).await?;
        Ok(response.running)
    }

    async fn start_clock(&self, request: &StartClock) -> Result<TimeEntry, ClockodoError> {
        let response: ClockResponse = self
            .request(Method::POST, "/clock", &[], Some(request))
            .await?;
        response
            .running
            .ok_or_else(|| ClockodoError::Transport("clock start returned no running entry".to_string()))
    }

    async fn stop_clock(&self, entry_id: EntryId) -> Result<TimeEntry, ClockodoError> {
        let path = format!("/clock/{entry_id}");
        let response: StopClockResponse = self.request::<_, ()>(Method::DELETE, &path, &[], None).await?;
        Ok(response.stopped)
    }

    async fn list_entries(&self, since: &str, until: &str) -> Result<Vec<TimeEntry>, ClockodoError> {
        let mut entries = Vec::new();
        let mut page = 1;
        loop {
            let query = [
                ("time_since", since.to_string()),
                ("time_until", until.to_string()),
                ("page", page.to_string()),
            ];
            let response: EntriesResponse = self.get("/entries", &query).await?;
            entries.extend(response.entries);
            match response.paging {
                Some(paging) if paging.current_page < paging.count_pages && page < MAX_PAGES => {
                    page = paging.current_page + 1;
                }
                _ => break,
            }
        }
        Ok(entries)
    }

    async fn create_entry(&self, request: &NewEntry) -> Result<TimeEntry, ClockodoError> {
        let response: EntryResponse = self
            .request(Method::POST, "/entries", &[], Some(request))
            .await?;
        Ok(response.entry)
    }
}

fn header_value(value: &str) -> Result<HeaderValue, ClockodoError> {
    HeaderValue::from_str(value)
        .map_err(|_| ClockodoError::validation("credentials contain characters not allowed in HTTP headers"))
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Maps a non-2xx response onto the error taxonomy.
fn classify(status: StatusCode, body: &str, retry_after: Option<Duration>) -> ClockodoError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(error_message)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error").to_string());
    let code = status.as_u16();

    match code {
        401 | 403 => ClockodoError::Auth { status: code, message },
        404 => ClockodoError::NotFound(message),
        409 => ClockodoError::AlreadyRunning(message),
        429 => ClockodoError::RateLimited { retry_after, message },
        400 | 422 => ClockodoError::Validation {
            message,
            fields: parsed.as_ref().map(field_errors).unwrap_or_default(),
        },
        _ => ClockodoError::Server { status: code, message },
    }
}

fn error_message(body: &Value) -> Option<String> {
    body.pointer("/error/message")
        .or_else(|| body.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

// Clockodo reports field errors either as a list of names or as a
// field -> message map.
fn field_errors(body: &Value) -> Vec<String> {
    match body.pointer("/error/fields").or_else(|| body.get("errors")) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(field, detail)| match detail {
                Value::String(text) => format!("{field}: {text}"),
                other => format!("{field}: {other}"),
            })
            .collect(),
        _ => Vec::new(),
    }
}
