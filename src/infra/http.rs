use async_trait::async_trait;
use reqwest::{
    Client,
    header::ACCEPT,
    multipart::{Form, Part},
};

use crate::domain::params::{FormField, FormValue};
use crate::error::{AppError, AppResult};
use crate::services::HttpTransport;

pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
        }
    }

    async fn build_form(fields: Vec<FormField>) -> AppResult<Form> {
        let mut form = Form::new();
        for field in fields {
            form = match field.value {
                FormValue::Text(text) => form.text(field.name, text),
                FormValue::File { path, file_name } => {
                    let contents = tokio::fs::read(&path).await.map_err(|err| {
                        AppError::Transport(format!(
                            "failed to read attachment {}: {err}",
                            path.display()
                        ))
                    })?;
                    form.part(field.name, Part::bytes(contents).file_name(file_name))
                }
            };
        }
        Ok(form)
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_form(&self, url: &str, fields: Vec<FormField>) -> AppResult<String> {
        let form = Self::build_form(fields).await?;

        let response = self
            .http
            .post(url)
            .header(ACCEPT, "text/xml")
            .multipart(form)
            .send()
            .await
            .map_err(|err| AppError::Transport(format!("failed to call FogBugz: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unable to read response>".to_string());
            return Err(AppError::Transport(format!(
                "FogBugz responded with {status}: {body}"
            )));
        }

        response
            .text()
            .await
            .map_err(|err| AppError::Transport(format!("failed to read FogBugz response: {err}")))
    }
}
