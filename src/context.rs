use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::infra::fogbugz::FogBugzSession;
use crate::services::{CredentialSource, HttpTransport};

#[derive(Clone)]
pub struct AppContext {
    pub config: AppConfig,
    pub transport: Arc<dyn HttpTransport>,
    pub credentials: Arc<dyn CredentialSource>,
}

impl AppContext {
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            config,
            transport,
            credentials,
        }
    }

    pub async fn open_session(&self) -> AppResult<FogBugzSession> {
        let base_url = self.config.base_url.as_deref().ok_or_else(|| {
            AppError::Configuration(
                "FogBugz base URL not configured; run `fbz config init` or set FBZ_BASE_URL"
                    .to_string(),
            )
        })?;
        FogBugzSession::open(base_url, self.credentials.as_ref(), self.transport.clone()).await
    }
}
