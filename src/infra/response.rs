use serde::Deserialize;

use crate::domain::case_xml::{CaseXml, case_child_elements};
use crate::error::{AppError, AppResult};

/// The `<response>` envelope shared by every FogBugz command.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ResponseXml {
    pub token: Option<String>,
    pub error: Option<ApiErrorXml>,
    pub case: Option<CaseXml>,
    pub cases: Option<CasesXml>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiErrorXml {
    #[serde(rename = "@code")]
    pub code: Option<String>,
    #[serde(rename = "$text")]
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CasesXml {
    #[serde(rename = "case")]
    pub items: Vec<CaseXml>,
}

impl ResponseXml {
    pub fn parse(body: &str) -> AppResult<Self> {
        let mut response: Self = quick_xml::de::from_str(body)
            .map_err(|err| AppError::Parse(format!("failed to parse FogBugz XML: {err}")))?;

        let mut child_elements = case_child_elements(body)?.into_iter();
        response.case = response.case.map(|case| {
            let present = child_elements.next().unwrap_or(false);
            case.with_child_elements(present)
        });
        if let Some(cases) = response.cases.as_mut() {
            cases.items = std::mem::take(&mut cases.items)
                .into_iter()
                .map(|case| {
                    let present = child_elements.next().unwrap_or(false);
                    case.with_child_elements(present)
                })
                .collect();
        }
        Ok(response)
    }

    /// Turns an `<error>` reply into an error value.
    pub fn into_result(self) -> AppResult<Self> {
        match self.error {
            Some(error) => Err(AppError::Api {
                code: error.code.unwrap_or_else(|| "?".to_string()),
                message: error.message.trim().to_string(),
            }),
            None => Ok(self),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}
