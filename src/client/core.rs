// File: src/client/core.rs
//! REST client for a Google-Tasks-shaped task service.
use crate::client::cert::NoVerifier;
use crate::client::middleware::{UserAgentLayer, UserAgentService, default_user_agent};
use crate::client::service::{ServiceError, TaskService};
use crate::model::{NewTask, TaskListRef, TaskStatus};

use http::header::{CONTENT_TYPE, HeaderValue};
use http::{Method, Request, Uri};
use http_body_util::BodyExt;
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceExt;
use tower_http::auth::AddAuthorization;
use tower_layer::Layer;

const LISTS_PATH: &str = "/users/@me/lists";
const PAGE_SIZE: usize = 100;

pub type HttpsClient = AddAuthorization<
    UserAgentService<Client<hyper_rustls::HttpsConnector<HttpConnector>, String>>,
>;

#[derive(Deserialize)]
struct ListPage {
    #[serde(default)]
    items: Vec<WireList>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireList {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    #[serde(default)]
    title: String,
}

#[derive(Serialize)]
struct WireTask<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    due: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

impl<'a> From<&'a NewTask> for WireTask<'a> {
    fn from(task: &'a NewTask) -> Self {
        Self {
            title: &task.title,
            // Needs-action is the service default; only completion is sent.
            status: match task.status {
                TaskStatus::Completed => Some("completed"),
                TaskStatus::NeedsAction => None,
            },
            due: task
                .due
                .map(|d| format!("{}T00:00:00.000Z", d.format("%Y-%m-%d"))),
            notes: task.notes.as_deref(),
        }
    }
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

#[derive(Clone, Debug)]
pub struct TasksClient {
    pub client: Option<HttpsClient>,
    base_url: String,
}

impl TasksClient {
    pub fn new(url: &str, token: &str, insecure: bool) -> Result<Self, ServiceError> {
        let base_url = url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Ok(Self {
                client: None,
                base_url,
            });
        }
        base_url
            .parse::<Uri>()
            .map_err(|e| ServiceError::InvalidRequest(format!("bad URL '{}': {}", url, e)))?;
        HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| ServiceError::InvalidRequest("token is not a valid header".to_string()))?;

        let tls_config_builder = rustls::ClientConfig::builder();

        let tls_config = if insecure {
            tls_config_builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()
        } else {
            let mut root_store = rustls::RootCertStore::empty();
            let result = rustls_native_certs::load_native_certs();
            root_store.add_parsable_certificates(result.certs);
            if root_store.is_empty() {
                return Err(ServiceError::InvalidRequest(
                    "No valid system certificates found.".to_string(),
                ));
            }
            tls_config_builder
                .with_root_certificates(root_store)
                .with_no_client_auth()
        };

        let https_connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .build();

        let http_client = Client::builder(TokioExecutor::new()).build(https_connector);
        let with_agent = UserAgentLayer::new(default_user_agent()).layer(http_client);
        let auth_client = AddAuthorization::bearer(with_agent, token);

        Ok(Self {
            client: Some(auth_client),
            base_url,
        })
    }

    pub fn is_offline(&self) -> bool {
        self.client.is_none()
    }

    async fn send(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<String>,
    ) -> Result<Vec<u8>, ServiceError> {
        let client = self.client.as_ref().ok_or(ServiceError::Offline)?;
        let uri: Uri = format!("{}{}", self.base_url, path_and_query)
            .parse()
            .map_err(|e: http::uri::InvalidUri| ServiceError::InvalidRequest(e.to_string()))?;

        let mut builder = Request::builder().method(method.clone()).uri(uri);
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        let req = builder
            .body(body.unwrap_or_default())
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

        let resp = client
            .clone()
            .oneshot(req)
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?
            .to_bytes();

        log::debug!("{} {} -> {}", method, path_and_query, status);

        if !status.is_success() {
            return Err(ServiceError::Status {
                status,
                body: String::from_utf8_lossy(&bytes).trim().to_string(),
            });
        }
        Ok(bytes.to_vec())
    }
}

impl TaskService for TasksClient {
    async fn list_all(&self) -> Result<Vec<TaskListRef>, ServiceError> {
        let mut lists = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut path = format!("{}?maxResults={}", LISTS_PATH, PAGE_SIZE);
            if let Some(token) = &page_token {
                path.push_str("&pageToken=");
                path.push_str(&encode_component(token));
            }

            let bytes = self.send(Method::GET, &path, None).await?;
            let page: ListPage = serde_json::from_slice(&bytes)
                .map_err(|e| ServiceError::Decode(format!("task lists: {}", e)))?;

            lists.extend(
                page.items
                    .into_iter()
                    .filter(|l| !l.id.is_empty())
                    .map(|l| TaskListRef {
                        name: l.title,
                        remote_id: l.id,
                    }),
            );

            match page.next_page_token {
                Some(next) if !next.is_empty() && page_token.as_deref() != Some(next.as_str()) => {
                    page_token = Some(next);
                }
                _ => break,
            }
        }

        Ok(lists)
    }

    async fn create_list(&self, name: &str) -> Result<TaskListRef, ServiceError> {
        let body = serde_json::to_string(&WireList {
            id: String::new(),
            title: name.to_string(),
        })
        .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;

        let bytes = self.send(Method::POST, LISTS_PATH, Some(body)).await?;
        let created: WireList = serde_json::from_slice(&bytes)
            .map_err(|e| ServiceError::Decode(format!("created list: {}", e)))?;
        if created.id.is_empty() {
            return Err(ServiceError::Decode(
                "created list has no identifier".to_string(),
            ));
        }

        Ok(TaskListRef {
            name: if created.title.is_empty() {
                name.to_string()
            } else {
                created.title
            },
            remote_id: created.id,
        })
    }

    async fn create_task(&self, list_id: &str, task: &NewTask) -> Result<(), ServiceError> {
        let body = serde_json::to_string(&WireTask::from(task))
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
        let path = format!("/lists/{}/tasks", encode_component(list_id));
        self.send(Method::POST, &path, Some(body)).await?;
        Ok(())
    }
}
