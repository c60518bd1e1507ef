mod dashboard;
mod logging;

pub use logging::{ARG_VERBOSITY, validator_log_level};

use clap::{
    Arg, ArgAction, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!(
            "{} - {}",
            env!("CARGO_PKG_VERSION"),
            crate::app_lib::GIT_COMMIT_HASH
        )
        .into_boxed_str(),
    );

    let command = Command::new("intake")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("api-url")
                .short('u')
                .long("api-url")
                .help("Base URL of the intake API, example: https://intake.example.org")
                .env("INTAKE_API_BASE_URL")
                .global(true),
        )
        .arg(
            Arg::new("environment")
                .short('e')
                .long("environment")
                .help("Deployment environment")
                .env("INTAKE_ENVIRONMENT")
                .default_value("production")
                .value_parser(["production", "development"])
                .global(true),
        )
        .arg(
            Arg::new("dev-bypass-code")
                .long("dev-bypass-code")
                .help("Second-factor bypass code, honored only in development")
                .env("INTAKE_DEV_BYPASS_CODE")
                .hide_env_values(true)
                .global(true),
        )
        .arg(
            Arg::new("session-file")
                .short('s')
                .long("session-file")
                .help("Where the verified session is kept between runs")
                .env("INTAKE_SESSION_FILE")
                .default_value(crate::app_lib::config::DEFAULT_SESSION_FILE)
                .global(true),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .help("HTTP request timeout in milliseconds")
                .env("INTAKE_TIMEOUT_MS")
                .default_value("10000")
                .value_parser(clap::value_parser!(u64).range(100..))
                .global(true),
        )
        .subcommand(
            Command::new("login")
                .about("PIN login followed by the emailed one-time code")
                .arg(
                    Arg::new("pin")
                        .long("pin")
                        .help("Operator PIN, prompted for when omitted")
                        .env("INTAKE_PIN")
                        .hide_env_values(true),
                )
                .arg(
                    Arg::new("code")
                        .long("code")
                        .help("One-time code, prompted for after it is sent when omitted"),
                ),
        )
        .subcommand(Command::new("logout").about("Forget the stored session"))
        .subcommand(
            Command::new("status").about("Show the session and which dashboard areas it opens"),
        )
        .subcommand(
            Command::new("register")
                .about("Submit a public intake registration")
                .arg(
                    Arg::new("full-name")
                        .long("full-name")
                        .help("Patient full name")
                        .required(true),
                )
                .arg(
                    Arg::new("date-of-birth")
                        .long("date-of-birth")
                        .help("Date of birth, YYYY-MM-DD")
                        .required(true),
                )
                .arg(
                    Arg::new("health-card")
                        .long("health-card")
                        .help("10-digit health card number"),
                )
                .arg(Arg::new("phone").long("phone").help("Phone number"))
                .arg(Arg::new("email").long("email").help("Email address"))
                .arg(
                    Arg::new("consent")
                        .long("consent")
                        .help("Patient consents to registration")
                        .action(ArgAction::SetTrue),
                ),
        );

    let command = dashboard::with_subcommands(command);
    logging::with_args(command)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "intake");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
        command.debug_assert();
    }

    #[test]
    fn test_check_login_args() {
        let matches = new().get_matches_from(vec![
            "intake",
            "--api-url",
            "https://intake.example.org",
            "login",
            "--pin",
            "4321",
            "--code",
            "123456",
        ]);

        assert_eq!(
            matches.get_one::<String>("api-url").cloned(),
            Some("https://intake.example.org".to_string())
        );
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "login");
        assert_eq!(
            sub.get_one::<String>("pin").cloned(),
            Some("4321".to_string())
        );
        assert_eq!(
            matches.get_one::<String>("environment").cloned(),
            Some("production".to_string())
        );
    }

    #[test]
    fn test_global_args_after_subcommand() {
        let matches = new().get_matches_from(vec![
            "intake",
            "status",
            "--api-url",
            "http://localhost:8000",
            "-vv",
        ]);
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "status");
        assert_eq!(
            sub.get_one::<String>("api-url").cloned(),
            Some("http://localhost:8000".to_string())
        );
        assert_eq!(sub.get_one::<u8>(ARG_VERBOSITY).copied(), Some(2));
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("INTAKE_API_BASE_URL", Some("https://intake.example.org")),
                ("INTAKE_ENVIRONMENT", Some("development")),
                ("INTAKE_DEV_BYPASS_CODE", Some("000000")),
                ("INTAKE_SESSION_FILE", Some("/tmp/intake-session.json")),
                ("INTAKE_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["intake", "status"]);
                assert_eq!(
                    matches.get_one::<String>("api-url").cloned(),
                    Some("https://intake.example.org".to_string())
                );
                assert_eq!(
                    matches.get_one::<String>("environment").cloned(),
                    Some("development".to_string())
                );
                assert_eq!(
                    matches.get_one::<String>("dev-bypass-code").cloned(),
                    Some("000000".to_string())
                );
                assert_eq!(
                    matches.get_one::<String>("session-file").cloned(),
                    Some("/tmp/intake-session.json".to_string())
                );
                assert_eq!(matches.get_one::<u8>(ARG_VERBOSITY).copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        // loop cover all possible value_parse
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars(
                [
                    ("INTAKE_LOG_LEVEL", Some(level)),
                    ("INTAKE_API_BASE_URL", Some("https://intake.example.org")),
                ],
                || {
                    let matches = new().get_matches_from(vec!["intake", "logout"]);
                    assert_eq!(
                        matches.get_one::<u8>(ARG_VERBOSITY).copied(),
                        u8::try_from(index).ok()
                    );
                },
            );
        }
    }

    #[test]
    fn test_check_log_level_numeric_and_invalid() {
        let parser = validator_log_level();
        let command = Command::new("t").arg(Arg::new("level").value_parser(parser));
        assert!(
            command
                .clone()
                .try_get_matches_from(vec!["t", "3"])
                .is_ok()
        );
        assert!(
            command
                .try_get_matches_from(vec!["t", "loud"])
                .is_err()
        );
    }
}
