use std::path::PathBuf;

use crate::context::AppContext;
use crate::domain::case::Case;
use crate::domain::params::RequestParams;
use crate::error::{AppError, AppResult};

// Every workflow opens its own session and closes it before returning,
// whether or not the operation succeeded.

pub async fn active_alerts(ctx: &AppContext, link_only: bool) -> AppResult<Vec<Case>> {
    let session = ctx.open_session().await?;
    let alerts = session.get_active_alerts(link_only).await;
    session.close().await;
    Ok(alerts)
}

pub async fn search(ctx: &AppContext, query: &str, columns: Option<&str>) -> AppResult<Vec<Case>> {
    let session = ctx.open_session().await?;
    let cases = session.try_search_cases(query, columns).await;
    session.close().await;
    cases
}

pub async fn show(ctx: &AppContext, id: u64) -> AppResult<Option<Case>> {
    let session = ctx.open_session().await?;
    let case = session.get_case(id).await;
    session.close().await;
    Ok(case)
}

pub async fn create(ctx: &AppContext, params: RequestParams) -> AppResult<Case> {
    let session = ctx.open_session().await?;
    let case = session.create_case(params).await;
    session.close().await;
    case
}

pub async fn call(ctx: &AppContext, command: &str, params: RequestParams) -> AppResult<String> {
    let session = ctx.open_session().await?;
    let body = session.call(command, &params).await;
    session.close().await;
    body
}

#[derive(Debug, Clone, Default)]
pub struct ForwardMessage {
    pub to: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub subject: String,
    pub body: String,
    pub files: Vec<PathBuf>,
}

/// Forwards a message on case `id`. The sender is the configured sender
/// address; the recipient defaults to the case's customer email.
pub async fn forward(ctx: &AppContext, id: u64, message: ForwardMessage) -> AppResult<()> {
    let from = ctx.config.sender_email.clone().ok_or_else(|| {
        AppError::Configuration(
            "sender email not configured; run `fbz config init` or set FBZ_SENDER_EMAIL"
                .to_string(),
        )
    })?;

    let session = ctx.open_session().await?;
    let result: AppResult<()> = async {
        let to = match message.to {
            Some(to) => to,
            None => session
                .get_case(id)
                .await
                .map(|case| case.customer_email().to_string())
                .filter(|email| !email.is_empty())
                .ok_or_else(|| {
                    AppError::OperationFailed(format!(
                        "case {id} not found or has no customer email"
                    ))
                })?,
        };

        let mut params = RequestParams::new()
            .field("bugId", id.to_string())
            .field("from", from)
            .field("to", to)
            .field("subject", message.subject)
            .field("event", message.body)
            .files(message.files);
        if let Some(cc) = message.cc {
            params.insert("CC", cc);
        }
        if let Some(bcc) = message.bcc {
            params.insert("BCC", bcc);
        }

        session.add_forward_event(params).await
    }
    .await;
    session.close().await;
    result
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::config::{AppConfig, StoredConfig};
    use crate::domain::credential::Credential;
    use crate::domain::params::FormField;
    use crate::infra::secrets::StaticCredentials;
    use crate::services::HttpTransport;

    struct ScriptedTransport {
        replies: Mutex<VecDeque<&'static str>>,
        commands: Mutex<Vec<(String, Vec<FormField>)>>,
    }

    impl ScriptedTransport {
        fn new(replies: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().copied().collect()),
                commands: Mutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<String> {
            self.commands
                .lock()
                .unwrap()
                .iter()
                .map(|(url, _)| url.rsplit('=').next().unwrap_or_default().to_string())
                .collect()
        }

        fn fields(&self, index: usize) -> Vec<FormField> {
            self.commands.lock().unwrap()[index].1.clone()
        }
    }

    #[async_trait]
    impl HttpTransport for ScriptedTransport {
        async fn post_form(&self, url: &str, fields: Vec<FormField>) -> AppResult<String> {
            self.commands
                .lock()
                .unwrap()
                .push((url.to_string(), fields));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .map(str::to_string)
                .ok_or_else(|| AppError::Transport("no reply scripted".to_string()))
        }
    }

    const LOGON: &str = "<response><token>tok</token></response>";
    const EMPTY: &str = "<response></response>";
    const CASE_7: &str = r#"<response><cases count="1"><case ixBug="7"><sTitle>Printer</sTitle><sCustomerEmail>reader@example.com</sCustomerEmail><dtOpened>2024-01-01T00:00:00Z</dtOpened></case></cases></response>"#;

    fn context(transport: Arc<ScriptedTransport>, sender: Option<&str>) -> AppContext {
        let config = AppConfig {
            base_url: Some("https://bugs.example.com".to_string()),
            sender_email: sender.map(str::to_string),
            stored: StoredConfig::default(),
        };
        AppContext::new(
            config,
            transport,
            Arc::new(StaticCredentials::new(Credential::new("librarian", "pw"))),
        )
    }

    fn field(fields: &[FormField], name: &str) -> Option<String> {
        fields
            .iter()
            .find(|field| field.name == name)
            .and_then(|field| field.text_value().map(str::to_string))
    }

    #[tokio::test]
    async fn failed_operation_still_logs_off() {
        let transport = ScriptedTransport::new(&[
            LOGON,
            r#"<response><error code="2">Forbidden</error></response>"#,
            EMPTY,
        ]);
        let ctx = context(transport.clone(), None);

        let err = create(&ctx, RequestParams::new().field("title", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Api { .. }));
        assert_eq!(transport.commands(), vec!["logon", "new", "logoff"]);
    }

    #[tokio::test]
    async fn forward_defaults_recipient_to_customer_email() {
        let transport = ScriptedTransport::new(&[LOGON, CASE_7, EMPTY, EMPTY]);
        let ctx = context(transport.clone(), Some("desk@example.com"));

        let message = ForwardMessage {
            subject: "Re: Printer".to_string(),
            body: "It works again.".to_string(),
            cc: Some("boss@example.com".to_string()),
            ..ForwardMessage::default()
        };
        forward(&ctx, 7, message).await.unwrap();

        assert_eq!(
            transport.commands(),
            vec!["logon", "search", "forward", "logoff"]
        );
        let fields = transport.fields(2);
        assert_eq!(field(&fields, "ixBug").as_deref(), Some("7"));
        assert_eq!(field(&fields, "sFrom").as_deref(), Some("desk@example.com"));
        assert_eq!(field(&fields, "sTo").as_deref(), Some("reader@example.com"));
        assert_eq!(field(&fields, "sSubject").as_deref(), Some("Re: Printer"));
        assert_eq!(field(&fields, "sEvent").as_deref(), Some("It works again."));
        assert_eq!(field(&fields, "sCC").as_deref(), Some("boss@example.com"));
        assert_eq!(field(&fields, "token").as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn forward_requires_sender_before_logon() {
        let transport = ScriptedTransport::new(&[]);
        let ctx = context(transport.clone(), None);

        let err = forward(&ctx, 7, ForwardMessage::default()).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(transport.commands().is_empty());
    }

    #[tokio::test]
    async fn forward_to_unknown_case_fails_and_logs_off() {
        let transport = ScriptedTransport::new(&[LOGON, EMPTY, EMPTY]);
        let ctx = context(transport.clone(), Some("desk@example.com"));

        let err = forward(&ctx, 99, ForwardMessage::default()).await.unwrap_err();
        assert!(matches!(err, AppError::OperationFailed(_)));
        assert_eq!(transport.commands(), vec!["logon", "search", "logoff"]);
    }

    #[tokio::test]
    async fn missing_base_url_is_configuration_error() {
        let transport = ScriptedTransport::new(&[]);
        let mut ctx = context(transport.clone(), None);
        ctx.config.base_url = None;

        let err = active_alerts(&ctx, false).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(transport.commands().is_empty());
    }

    #[tokio::test]
    async fn show_returns_case() {
        let transport = ScriptedTransport::new(&[LOGON, CASE_7, EMPTY]);
        let ctx = context(transport.clone(), None);

        let case = show(&ctx, 7).await.unwrap().unwrap();
        assert_eq!(case.title(), "Printer");
        assert_eq!(transport.commands(), vec!["logon", "search", "logoff"]);
    }
}
