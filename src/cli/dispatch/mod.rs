use crate::app_lib::{AppConfig, Environment};
use crate::cli::{
    actions::{Action, dashboard, register, session},
    globals::GlobalArgs,
};
use crate::features::registrations::{ListKind, MutationAction, RegistrationRequest};
use anyhow::{Context, Result, anyhow};
use secrecy::SecretString;
use std::path::PathBuf;
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let globals = globals(matches)?;
    let (name, sub) = matches
        .subcommand()
        .context("missing subcommand, see --help")?;

    let action = match name {
        "login" => Action::Login(session::LoginArgs {
            globals,
            pin: secret(sub, "pin"),
            code: secret(sub, "code"),
        }),
        "logout" => Action::Logout(globals),
        "status" => Action::Status(globals),
        "list" => Action::List(dashboard::ListArgs {
            globals,
            kind: list_kind(sub)?,
            page: page(sub),
            filters: filters(sub)?,
            summary: sub.get_flag("summary"),
        }),
        "finalize" | "revert" | "delete" => {
            let (kind, action) = match name {
                "finalize" => (ListKind::Pending, MutationAction::Finalize),
                "revert" => (ListKind::Submitted, MutationAction::Revert),
                _ => (list_kind(sub)?, MutationAction::Delete),
            };
            Action::Mutate(dashboard::MutateArgs {
                globals,
                kind,
                action,
                id: required(sub, "id")?,
                page: page(sub),
                yes: sub.get_flag("yes"),
            })
        }
        "photo" => Action::Photo(dashboard::PhotoArgs {
            globals,
            id: required(sub, "id")?,
            output: sub.get_one::<String>("output").map(PathBuf::from),
        }),
        "register" => Action::Register(register::Args {
            globals,
            request: RegistrationRequest {
                full_name: required(sub, "full-name")?,
                date_of_birth: required(sub, "date-of-birth")?,
                health_card_number: sub.get_one::<String>("health-card").cloned(),
                phone_number: sub.get_one::<String>("phone").cloned(),
                email: sub.get_one::<String>("email").cloned(),
                consent_given: sub.get_flag("consent"),
            },
        }),
        other => return Err(anyhow!("unknown subcommand: {other}")),
    };
    Ok(action)
}

fn globals(matches: &clap::ArgMatches) -> Result<GlobalArgs> {
    let api_url = matches
        .get_one::<String>("api-url")
        .context("missing required argument: --api-url (or INTAKE_API_BASE_URL)")?;
    let environment = matches
        .get_one::<String>("environment")
        .map(|value| value.parse::<Environment>())
        .transpose()?
        .unwrap_or_default();
    let timeout = matches
        .get_one::<u64>("timeout-ms")
        .copied()
        .map(Duration::from_millis);

    let mut config = AppConfig::new(api_url)
        .context("invalid INTAKE_API_BASE_URL")?
        .with_environment(environment)
        .with_dev_bypass_code(matches.get_one::<String>("dev-bypass-code").map(String::as_str));
    if let Some(timeout) = timeout {
        config = config.with_request_timeout(timeout);
    }
    if let Some(path) = matches.get_one::<String>("session-file") {
        config = config.with_session_file(PathBuf::from(path));
    }
    Ok(GlobalArgs::new(config))
}

fn secret(matches: &clap::ArgMatches, id: &str) -> Option<SecretString> {
    matches
        .get_one::<String>(id)
        .map(|value| SecretString::from(value.clone()))
}

fn required(matches: &clap::ArgMatches, id: &str) -> Result<String> {
    matches
        .get_one::<String>(id)
        .cloned()
        .with_context(|| format!("missing required argument: {id}"))
}

fn page(matches: &clap::ArgMatches) -> u32 {
    matches.get_one::<u32>("page").copied().unwrap_or(1)
}

fn list_kind(matches: &clap::ArgMatches) -> Result<ListKind> {
    required(matches, "kind")?
        .parse::<ListKind>()
        .map_err(|err| anyhow!(err))
}

/// Splits `field=value` pairs; the value may be empty to clear a filter.
fn filters(matches: &clap::ArgMatches) -> Result<Vec<(String, String)>> {
    matches
        .get_many::<String>("filter")
        .into_iter()
        .flatten()
        .map(|pair| {
            pair.split_once('=')
                .map(|(field, value)| (field.trim().to_string(), value.to_string()))
                .with_context(|| format!("invalid filter '{pair}', expected field=value"))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::handler;
    use crate::app_lib::Environment;
    use crate::cli::{actions::Action, commands};
    use crate::features::registrations::{ListKind, MutationAction};
    use secrecy::ExposeSecret;

    #[test]
    fn login_builds_config_and_secrets() {
        let matches = commands::new().get_matches_from(vec![
            "intake",
            "-u",
            "https://intake.example.org/",
            "-e",
            "development",
            "--dev-bypass-code",
            "000000",
            "login",
            "--pin",
            "4321",
        ]);
        let Action::Login(args) = handler(&matches).unwrap() else {
            panic!("expected login action");
        };
        assert_eq!(args.globals.config.api_base_url, "https://intake.example.org");
        assert_eq!(args.globals.config.environment, Environment::Development);
        assert_eq!(args.globals.config.effective_bypass_code(), Some("000000"));
        assert_eq!(args.pin.unwrap().expose_secret(), "4321");
        assert!(args.code.is_none());
    }

    #[test]
    fn revert_targets_submitted_list() {
        let matches = commands::new().get_matches_from(vec![
            "intake", "-u", "http://localhost:8000", "revert", "r9", "-p", "3", "-y",
        ]);
        let Action::Mutate(args) = handler(&matches).unwrap() else {
            panic!("expected mutate action");
        };
        assert_eq!(args.kind, ListKind::Submitted);
        assert_eq!(args.action, MutationAction::Revert);
        assert_eq!(args.id, "r9");
        assert_eq!(args.page, 3);
        assert!(args.yes);
    }

    #[test]
    fn malformed_filter_is_an_error() {
        let matches = commands::new().get_matches_from(vec![
            "intake",
            "-u",
            "http://localhost:8000",
            "list",
            "-f",
            "search_name",
        ]);
        assert!(handler(&matches).is_err());
    }

    #[test]
    fn missing_api_url_is_an_error() {
        temp_env::with_var_unset("INTAKE_API_BASE_URL", || {
            let matches = commands::new().get_matches_from(vec!["intake", "status"]);
            let err = handler(&matches).unwrap_err();
            assert!(err.to_string().contains("--api-url"));
        });
    }
}
