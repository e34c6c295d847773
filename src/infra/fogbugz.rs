use std::fmt;
use std::sync::Arc;

use reqwest::Url;
use tracing::{Instrument, Span, debug, info_span, warn};

use crate::config::mask_secret;
use crate::domain::case::Case;
use crate::domain::case_xml::DEFAULT_COLUMNS;
use crate::domain::credential::Credential;
use crate::domain::params::{FormField, RequestParams, map_params};
use crate::error::{AppError, AppResult};
use crate::infra::response::ResponseXml;
use crate::services::{CredentialSource, HttpTransport};

const ALERTS_QUERY: &str = r#"alertxdisplay:"yes" -status:"closed""#;
const LINKED_ALERTS_QUERY: &str =
    r#"alertxdisplay:"Yes and include link in catalogue tab" -status:"closed""#;

/// The only commands the adapter will send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Logon,
    Logoff,
    Forward,
    New,
    Search,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Logon => "logon",
            Command::Logoff => "logoff",
            Command::Forward => "forward",
            Command::New => "new",
            Command::Search => "search",
        }
    }

    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "logon" => Ok(Command::Logon),
            "logoff" => Ok(Command::Logoff),
            "forward" => Ok(Command::Forward),
            "new" => Ok(Command::New),
            "search" => Ok(Command::Search),
            other => Err(AppError::UnsupportedCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authenticated FogBugz API session.
///
/// [`FogBugzSession::open`] logs on and [`FogBugzSession::close`] logs off;
/// every other call carries the session token.
pub struct FogBugzSession {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    token: Option<String>,
    span: Span,
}

impl FogBugzSession {
    pub async fn open(
        base_url: &str,
        credentials: &dyn CredentialSource,
        transport: Arc<dyn HttpTransport>,
    ) -> AppResult<Self> {
        let endpoint = Self::api_endpoint(base_url)?;

        let credential = match credentials.fetch().await {
            Ok(Some(credential)) if credential.is_complete() => credential,
            Ok(_) => {
                return Err(AppError::Configuration(
                    "FogBugz credentials not configured".to_string(),
                ));
            }
            Err(err) => {
                warn!(error = %err, "unable to read FogBugz credentials");
                return Err(AppError::Configuration(format!(
                    "FogBugz credentials unavailable: {err}"
                )));
            }
        };

        let span = info_span!("fogbugz_session", endpoint = %endpoint);
        let mut session = Self {
            transport,
            endpoint,
            token: None,
            span,
        };

        let token = session.logon(&credential).await.ok_or_else(|| {
            AppError::Configuration(
                "could not obtain a FogBugz token; check the base URL and credentials"
                    .to_string(),
            )
        })?;
        session.span.in_scope(|| debug!(token = %mask_secret(&token), "created token"));
        session.token = Some(token);

        Ok(session)
    }

    /// Logs off. Failures are logged and otherwise ignored.
    pub async fn close(mut self) {
        if self.token.is_none() {
            return;
        }
        if let Err(err) = self
            .send_request(Command::Logoff, &RequestParams::new())
            .await
        {
            self.span
                .in_scope(|| warn!(error = %err, "logoff failed; token may stay active"));
        }
        if let Some(token) = self.token.take() {
            self.span
                .in_scope(|| debug!(token = %mask_secret(&token), "invalidated token"));
        }
    }

    pub async fn create_case(&self, params: RequestParams) -> AppResult<Case> {
        let params = if params.contains("cols") {
            params
        } else {
            params.field("cols", DEFAULT_COLUMNS)
        };

        let response = self.send_request(Command::New, &params).await?;
        let wire = response.case.ok_or_else(|| {
            AppError::OperationFailed("FogBugz reply to new carried no case".to_string())
        })?;

        Case::decode(wire)?.ok_or_else(|| {
            AppError::OperationFailed("FogBugz did not return a case identifier".to_string())
        })
    }

    pub async fn add_forward_event(&self, params: RequestParams) -> AppResult<()> {
        self.send_request(Command::Forward, &params).await?;
        Ok(())
    }

    /// Runs a search, telling failure apart from an empty result.
    pub async fn try_search_cases(
        &self,
        query: &str,
        columns: Option<&str>,
    ) -> AppResult<Vec<Case>> {
        let params = RequestParams::new()
            .field("q", query)
            .field("cols", columns.unwrap_or(DEFAULT_COLUMNS));

        let response = self.send_request(Command::Search, &params).await?;
        let wires = response
            .cases
            .map(|cases| cases.items)
            .unwrap_or_default();

        let mut cases = Vec::with_capacity(wires.len());
        for wire in wires {
            match Case::decode(wire) {
                Ok(Some(case)) => cases.push(case),
                Ok(None) => {}
                Err(err) => self
                    .span
                    .in_scope(|| warn!(error = %err, "skipping undecodable case")),
            }
        }
        self.span
            .in_scope(|| debug!(query, count = cases.len(), "search returned cases"));
        Ok(cases)
    }

    /// Like [`Self::try_search_cases`] but degrades to an empty list.
    pub async fn search_cases(&self, query: &str, columns: Option<&str>) -> Vec<Case> {
        self.try_search_cases(query, columns)
            .await
            .unwrap_or_default()
    }

    pub async fn get_case(&self, id: u64) -> Option<Case> {
        self.search_cases(&id.to_string(), None)
            .await
            .into_iter()
            .next()
    }

    /// Alert cases, most recently opened first.
    pub async fn get_active_alerts(&self, link_only: bool) -> Vec<Case> {
        let query = if link_only {
            LINKED_ALERTS_QUERY
        } else {
            ALERTS_QUERY
        };
        let mut alerts = self.search_cases(query, None).await;
        alerts.sort_by(|a, b| b.opened().cmp(&a.opened()));
        alerts
    }

    /// Sends a data command by name and returns the raw XML reply.
    pub async fn call(&self, command: &str, params: &RequestParams) -> AppResult<String> {
        let command = Command::parse(command)?;
        if matches!(command, Command::Logon | Command::Logoff) {
            return Err(AppError::UnsupportedCommand(format!(
                "{command} is handled by the session itself"
            )));
        }

        let body = self.post(command, params).await?;
        self.checked(command, ResponseXml::parse(&body))?;
        Ok(body)
    }

    async fn logon(&self, credential: &Credential) -> Option<String> {
        let params = RequestParams::new()
            .field("email", credential.username.as_str())
            .field("password", credential.password.as_str());

        match self.send_request(Command::Logon, &params).await {
            Ok(response) => {
                let token = response.token().map(str::to_string);
                if token.is_none() {
                    self.span
                        .in_scope(|| warn!("logon reply carried no token"));
                }
                token
            }
            Err(_) => {
                self.span.in_scope(|| warn!("unable to fetch token"));
                None
            }
        }
    }

    async fn send_request(
        &self,
        command: Command,
        params: &RequestParams,
    ) -> AppResult<ResponseXml> {
        let body = self.post(command, params).await?;
        self.checked(command, ResponseXml::parse(&body))
    }

    async fn post(&self, command: Command, params: &RequestParams) -> AppResult<String> {
        let mut fields = map_params(params);
        if command != Command::Logon {
            let token = self.token.as_deref().ok_or_else(|| {
                AppError::Configuration(format!("no FogBugz token for {command}"))
            })?;
            fields.push(FormField::text("token", token));
        }

        let url = format!("{}?cmd={}", self.endpoint, command.as_str());
        self.transport
            .post_form(&url, fields)
            .instrument(self.span.clone())
            .await
            .inspect_err(|err| {
                self.span
                    .in_scope(|| warn!(%command, error = %err, "failed request"))
            })
    }

    fn checked(&self, command: Command, parsed: AppResult<ResponseXml>) -> AppResult<ResponseXml> {
        parsed.and_then(ResponseXml::into_result).inspect_err(|err| {
            self.span
                .in_scope(|| warn!(%command, error = %err, "unusable FogBugz reply"))
        })
    }

    fn api_endpoint(base_url: &str) -> AppResult<String> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(AppError::Configuration(
                "FogBugz base URL not configured".to_string(),
            ));
        }
        Url::parse(base_url).map_err(|err| {
            AppError::Configuration(format!("invalid FogBugz base URL {base_url:?}: {err}"))
        })?;
        Ok(format!("{base_url}/api.asp"))
    }
}

impl Drop for FogBugzSession {
    fn drop(&mut self) {
        if self.token.is_some() {
            self.span
                .in_scope(|| warn!("session dropped without logoff; token left active"));
        }
    }
}
