use std::io::{self, BufRead, Write};

use clap::{Args, Subcommand};

use fogbugz_alerts::config::{StoredConfig, config_file_path, validate_base_url, validate_email};
use fogbugz_alerts::error::AppResult;
use fogbugz_alerts::infra::secrets::KeyringCredentials;

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommand {
    /// Run the interactive configuration wizard.
    Init,
    /// Show the stored configuration.
    Show,
}

pub fn run(command: ConfigCommand) -> AppResult<()> {
    match command {
        ConfigCommand::Init => run_init(),
        ConfigCommand::Show => run_show(),
    }
}

/// A value asked for by the wizard.
struct Field {
    label: &'static str,
    secret: bool,
    check: fn(&str) -> AppResult<()>,
}

const BASE_URL: Field = Field {
    label: "FogBugz URL (e.g., https://yourcompany.fogbugz.com)",
    secret: false,
    check: validate_base_url,
};

const SENDER_EMAIL: Field = Field {
    label: "Sender email for forwarded messages",
    secret: false,
    check: validate_email,
};

const USERNAME: Field = Field {
    label: "FogBugz username",
    secret: false,
    check: accept_any,
};

const PASSWORD: Field = Field {
    label: "FogBugz password",
    secret: true,
    check: accept_any,
};

fn run_init() -> AppResult<()> {
    let mut cfg = StoredConfig::load()?;
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    println!("Configuring fbz.");
    println!("Press Enter to keep the current value, '-' to clear it.");
    println!("The password goes to the system keyring; FBZ_USERNAME/FBZ_PASSWORD override it.");
    println!();

    for (field, target) in [
        (&BASE_URL, &mut cfg.base_url),
        (&SENDER_EMAIL, &mut cfg.sender_email),
        (&USERNAME, &mut cfg.username),
    ] {
        let action = prompt_field(&mut input, &mut output, field, target.as_deref())?;
        action.apply(target);
    }

    cfg.save()?;
    let path = config_file_path()?;
    println!("Configuration saved to {}", path.display());

    let keyring = KeyringCredentials::from_config(&cfg);
    let stored = keyring.password()?.map(|_| "****");
    match prompt_field(&mut input, &mut output, &PASSWORD, stored)? {
        PromptAction::Keep => {}
        PromptAction::Clear => {
            keyring.delete_password()?;
            println!("Password removed from the system keyring.");
        }
        PromptAction::Set(password) => {
            keyring.store_password(&password)?;
            println!("Password stored in the system keyring.");
        }
    }
    Ok(())
}

fn run_show() -> AppResult<()> {
    let cfg = StoredConfig::load()?;
    let path = config_file_path()?;

    let password = match KeyringCredentials::from_config(&cfg).password() {
        Ok(Some(_)) => "stored in system keyring".to_string(),
        Ok(None) => "<not set>".to_string(),
        Err(err) => format!("unavailable ({err})"),
    };

    println!("Configuration file: {}", path.display());
    println!("FogBugz URL: {}", display_value(&cfg.base_url));
    println!("Sender email: {}", display_value(&cfg.sender_email));
    println!("Username: {}", display_value(&cfg.username));
    println!("Password: {password}");

    Ok(())
}

/// Asks for one value until the answer passes the field's check.
/// End of input keeps the current value.
fn prompt_field<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    field: &Field,
    current: Option<&str>,
) -> AppResult<PromptAction> {
    loop {
        match (current, field.secret) {
            (Some(_), true) => write!(
                output,
                "{} [****] (Enter to keep, '-' to clear): ",
                field.label
            )?,
            (Some(value), false) => write!(
                output,
                "{} [{value}] (Enter to keep, '-' to clear): ",
                field.label
            )?,
            (None, _) => write!(output, "{} (Enter to skip): ", field.label)?,
        }
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(PromptAction::Keep);
        }
        let action = PromptAction::from_input(&line);
        if let PromptAction::Set(value) = &action {
            if let Err(err) = (field.check)(value) {
                writeln!(output, "  {err}")?;
                continue;
            }
        }
        return Ok(action);
    }
}

fn accept_any(_: &str) -> AppResult<()> {
    Ok(())
}

fn display_value(value: &Option<String>) -> &str {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .unwrap_or("<not set>")
}

#[derive(Debug, PartialEq)]
enum PromptAction {
    Keep,
    Clear,
    Set(String),
}

impl PromptAction {
    fn from_input(input: &str) -> Self {
        match input.trim() {
            "" => PromptAction::Keep,
            "-" => PromptAction::Clear,
            value => PromptAction::Set(value.to_string()),
        }
    }

    fn apply(self, target: &mut Option<String>) {
        match self {
            PromptAction::Keep => {}
            PromptAction::Clear => *target = None,
            PromptAction::Set(value) => *target = Some(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn answer(field: &Field, current: Option<&str>, typed: &str) -> (PromptAction, String) {
        let mut input = Cursor::new(typed.as_bytes().to_vec());
        let mut output = Vec::new();
        let action = prompt_field(&mut input, &mut output, field, current).unwrap();
        (action, String::from_utf8(output).unwrap())
    }

    #[test]
    fn interprets_prompt_input() {
        assert_eq!(PromptAction::from_input("\n"), PromptAction::Keep);
        assert_eq!(PromptAction::from_input(" - \n"), PromptAction::Clear);
        assert_eq!(
            PromptAction::from_input("https://bugs.example.com\n"),
            PromptAction::Set("https://bugs.example.com".to_string())
        );
    }

    #[test]
    fn reprompts_until_url_is_valid() {
        let (action, printed) = answer(
            &BASE_URL,
            None,
            "bugs.example.com\nftp://bugs.example.com\nhttps://bugs.example.com\n",
        );
        assert_eq!(
            action,
            PromptAction::Set("https://bugs.example.com".to_string())
        );
        assert_eq!(printed.matches("(Enter to skip)").count(), 3);
        assert!(printed.contains("must use http or https"));
    }

    #[test]
    fn rejects_malformed_sender_email() {
        let (action, printed) = answer(&SENDER_EMAIL, Some("desk@example.com"), "desk\n-\n");
        assert_eq!(action, PromptAction::Clear);
        assert!(printed.contains("invalid email address format"));
    }

    #[test]
    fn never_echoes_stored_password() {
        let (action, printed) = answer(&PASSWORD, Some("****"), "\n");
        assert_eq!(action, PromptAction::Keep);
        assert!(printed.starts_with("FogBugz password [****]"));

        let (action, _) = answer(&USERNAME, Some("librarian"), "");
        assert_eq!(action, PromptAction::Keep);
    }

    #[test]
    fn applies_prompt_actions() {
        let mut value = Some("old".to_string());
        PromptAction::Set("new".to_string()).apply(&mut value);
        assert_eq!(value.as_deref(), Some("new"));
        PromptAction::Keep.apply(&mut value);
        assert_eq!(value.as_deref(), Some("new"));
        PromptAction::Clear.apply(&mut value);
        assert_eq!(value, None);
    }

    #[test]
    fn displays_unset_values() {
        assert_eq!(display_value(&None), "<not set>");
        assert_eq!(display_value(&Some(String::new())), "<not set>");
        assert_eq!(
            display_value(&Some("desk@example.com".to_string())),
            "desk@example.com"
        );
    }
}
