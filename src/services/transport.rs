use async_trait::async_trait;

use crate::domain::params::FormField;
use crate::error::AppResult;

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POSTs `fields` as `multipart/form-data` and returns the response body.
    async fn post_form(&self, url: &str, fields: Vec<FormField>) -> AppResult<String>;
}
