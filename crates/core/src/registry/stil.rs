//! STIL "tilslutning" portal client.
//!
//! The portal is stateful: an organisation must be made active before its
//! data-access agreements can be read or changed. Every HTTP request made
//! here is counted against the shared [`RateLimiter`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::metrics;

use super::rate_limiter::RateLimiter;
use super::types::{
    Agreement, AgreementStatus, Institution, InstitutionKind, InstitutionRef, TargetStatus,
};
use super::{RegistryError, RegistrySession};

const ORGANISATIONS_PATH: &str = "/tilslutningBE/organisationer";
const ACTIVE_ORGANISATION_PATH: &str = "/tilslutningBE/active-organisation";
const AGREEMENTS_PATH: &str = "/dataadgangadmBE/api/adgang/hent";
const SET_STATUS_PATH: &str = "/dataadgangadmBE/api/adgang/setStatus";
const DELETE_PATH: &str = "/dataadgangadmBE/api/adgang/slet";

/// HTTP client for the STIL registry portal.
pub struct StilRegistryClient {
    client: Client,
    base_url: String,
    limiter: Arc<RateLimiter>,
    /// Raw organisation entries, needed verbatim to select an organisation.
    organisations: RwLock<HashMap<InstitutionRef, Value>>,
}

impl StilRegistryClient {
    /// Create a client on top of an existing browser session.
    ///
    /// Fails fast when no session cookie was handed over.
    pub fn new(config: &RegistryConfig, limiter: Arc<RateLimiter>) -> Result<Self, RegistryError> {
        if config.session_cookie.trim().is_empty() {
            return Err(RegistryError::SessionMissing(
                "no session cookie configured, log in to the registry first".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&config.session_cookie).map_err(|e| {
                RegistryError::SessionMissing(format!("invalid session cookie: {}", e))
            })?,
        );
        if let Some(token) = config.xsrf_token.as_deref().filter(|t| !t.is_empty()) {
            headers.insert(
                "x-xsrf-token",
                HeaderValue::from_str(token).map_err(|e| {
                    RegistryError::SessionMissing(format!("invalid XSRF token: {}", e))
                })?,
            );
        }
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter,
            organisations: RwLock::new(HashMap::new()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send one request, counting it against the rate limiter and mapping
    /// non-success statuses onto [`RegistryError`].
    async fn send(
        &self,
        operation: &'static str,
        subject: &str,
        request: RequestBuilder,
    ) -> Result<Response, RegistryError> {
        self.limiter.record_call().await;

        let started = Instant::now();
        let result = request.send().await;
        metrics::REGISTRY_CALL_DURATION
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::REGISTRY_CALLS
                    .with_label_values(&[operation, "error"])
                    .inc();
                return Err(map_transport_error(e));
            }
        };

        let status = response.status();
        if status.is_success() {
            metrics::REGISTRY_CALLS
                .with_label_values(&[operation, "success"])
                .inc();
            return Ok(response);
        }

        metrics::REGISTRY_CALLS
            .with_label_values(&[operation, "error"])
            .inc();
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status.as_u16(), body, subject))
    }

    /// Fetch the organisation list and refresh the payload cache.
    async fn load_organisations(&self) -> Result<Vec<Institution>, RegistryError> {
        debug!("Fetching organisation list");

        let response = self
            .send(
                "list_organisations",
                "organisation list",
                self.client.get(self.url(ORGANISATIONS_PATH)),
            )
            .await?;

        let list: OrganisationListResponse = response.json().await.map_err(|e| {
            RegistryError::ParseError(format!("Failed to parse organisation list: {}", e))
        })?;

        let mut institutions = Vec::new();
        let mut payloads = HashMap::new();
        let groups = [
            (InstitutionKind::Institution, list.institutioner),
            (InstitutionKind::Daycare, list.dagtilbud),
        ];
        for (kind, entries) in groups {
            for entry in entries {
                let Some(id) = entry.get("kode").and_then(value_as_string) else {
                    continue;
                };
                let name = entry
                    .get("navn")
                    .and_then(value_as_string)
                    .unwrap_or_default();
                payloads.insert(InstitutionRef::new(kind, id.clone()), entry);
                institutions.push(Institution { id, name, kind });
            }
        }

        *self.organisations.write().await = payloads;
        Ok(institutions)
    }

    async fn payload_for(&self, institution: &InstitutionRef) -> Result<Value, RegistryError> {
        if self.organisations.read().await.is_empty() {
            self.load_organisations().await?;
        }

        self.organisations
            .read()
            .await
            .get(institution)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("organisation {}", institution)))
    }

    /// Make `institution` the active organisation of the session.
    async fn select_organisation(&self, institution: &InstitutionRef) -> Result<(), RegistryError> {
        let payload = self.payload_for(institution).await?;
        debug!(institution = %institution, "Selecting active organisation");

        self.send(
            "select_organisation",
            &format!("organisation {}", institution),
            self.client
                .post(self.url(ACTIVE_ORGANISATION_PATH))
                .json(&payload),
        )
        .await?;

        Ok(())
    }
}

#[async_trait]
impl RegistrySession for StilRegistryClient {
    async fn list_institutions(&self) -> Result<Vec<Institution>, RegistryError> {
        self.load_organisations().await
    }

    async fn list_agreements_for(
        &self,
        institution: &Institution,
    ) -> Result<Vec<Agreement>, RegistryError> {
        let reference = institution.reference();
        self.select_organisation(&reference).await?;

        let response = self
            .send(
                "list_agreements",
                &format!("agreements of {}", reference),
                self.client.get(self.url(AGREEMENTS_PATH)),
            )
            .await?;

        let results: Vec<AgreementResult> = response.json().await.map_err(|e| {
            RegistryError::ParseError(format!(
                "Failed to parse agreements of {}: {}",
                reference, e
            ))
        })?;

        let agreements = results
            .into_iter()
            .filter_map(|r| r.into_agreement(institution))
            .collect();

        Ok(agreements)
    }

    async fn apply_status_transition(
        &self,
        institution: &InstitutionRef,
        agreement_id: &str,
        target: TargetStatus,
    ) -> Result<(), RegistryError> {
        self.select_organisation(institution).await?;

        let subject = format!("agreement {} of {}", agreement_id, institution);
        debug!(agreement_id, target = %target, "Applying status transition");

        match target {
            TargetStatus::Delete => {
                let url = format!("{}/{}", self.url(DELETE_PATH), agreement_id);
                self.send("delete_agreement", &subject, self.client.delete(url))
                    .await?;
            }
            TargetStatus::Approve | TargetStatus::Await => {
                let body = json!({
                    "aftaleid": agreement_id_value(agreement_id),
                    "status": target.resulting_status().as_str(),
                    "kommentar": Value::Null,
                });
                self.send(
                    "set_status",
                    &subject,
                    self.client.post(self.url(SET_STATUS_PATH)).json(&body),
                )
                .await?;
            }
        }

        Ok(())
    }
}

fn map_transport_error(e: reqwest::Error) -> RegistryError {
    if e.is_timeout() || e.is_connect() {
        RegistryError::Transient(e.to_string())
    } else {
        RegistryError::HttpError(e)
    }
}

fn status_error(status: u16, body: String, subject: &str) -> RegistryError {
    match status {
        401 | 403 => RegistryError::SessionExpired { status },
        404 => RegistryError::NotFound(subject.to_string()),
        429 => RegistryError::RateLimitExceeded,
        s if s >= 500 => RegistryError::Transient(format!("HTTP {}: {}", s, body)),
        _ => RegistryError::Rejected {
            status,
            message: body,
        },
    }
}

fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The portal uses numeric agreement ids; keep anything else as a string.
fn agreement_id_value(agreement_id: &str) -> Value {
    agreement_id
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(agreement_id))
}

// ============================================================================
// Portal Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct OrganisationListResponse {
    #[serde(default)]
    institutioner: Vec<Value>,
    #[serde(default)]
    dagtilbud: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    #[serde(default)]
    navn: String,
}

#[derive(Debug, Deserialize)]
struct StilService {
    #[serde(default)]
    servicenavn: String,
}

#[derive(Debug, Deserialize)]
struct AgreementResult {
    id: Value,
    #[serde(rename = "udbyderSystemOgUdbyder")]
    provider: Option<NamedEntity>,
    #[serde(rename = "stilService")]
    stil_service: Option<StilService>,
    #[serde(rename = "aktuelStatus", default)]
    current_status: Option<String>,
}

impl AgreementResult {
    /// Agreements without a STIL service are portal bookkeeping, not
    /// data-processing agreements.
    fn into_agreement(self, institution: &Institution) -> Option<Agreement> {
        let service = self.stil_service?;
        let agreement_id = value_as_string(&self.id)?;

        Some(Agreement {
            institution: institution.reference(),
            institution_name: institution.name.clone(),
            agreement_id,
            system_name: self.provider.map(|p| p.navn).unwrap_or_default(),
            service_name: service.servicenavn,
            current_status: AgreementStatus::from(self.current_status.unwrap_or_default()),
        })
    }
}
