use async_trait::async_trait;

use crate::domain::credential::Credential;
use crate::error::AppResult;

#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// `Ok(None)` when the store holds no credential.
    async fn fetch(&self) -> AppResult<Option<Credential>>;
}
