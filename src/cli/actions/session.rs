use crate::cli::globals::GlobalArgs;
use crate::features::auth::{
    AccessPredicates, AuthApi, AuthState, GuardDecision, SecondFactorController, guard_path,
    types::Capability,
};
use crate::routes::paths;
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

#[derive(Debug)]
pub struct LoginArgs {
    pub globals: GlobalArgs,
    pub pin: Option<SecretString>,
    pub code: Option<SecretString>,
}

/// PIN login, code delivery and verification in one run. The session file is
/// written only once the code is verified.
///
/// # Errors
/// Returns an error if the PIN or the code is rejected or the API is unreachable.
pub async fn login(args: LoginArgs) -> Result<()> {
    let api = Arc::new(args.globals.api()?);
    let auth = args.globals.restored_auth().await;

    if auth.lock().await.is_fully_authenticated() {
        println!("Already logged in. Run `intake logout` first to switch operators.");
        return Ok(());
    }

    let pin = match args.pin {
        Some(pin) => pin,
        None => prompt_secret("PIN: ").await?,
    };
    let response = api
        .login_pin(pin.expose_secret())
        .await
        .context("PIN login failed")?;
    let token = response.session_token.clone();
    auth.lock().await.login_primary(
        response.user.into(),
        response.permissions,
        response.session_token,
    );

    let second_factor = SecondFactorController::new(api, Arc::clone(&auth))
        .with_dev_bypass(&args.globals.config);
    let status = second_factor
        .send(&token)
        .await
        .context("Could not send the verification code")?;
    println!(
        "Verification code sent. A new one can be requested in {}s.",
        status.countdown_seconds
    );

    let code = match args.code {
        Some(code) => code,
        None => prompt_secret("Code: ").await?,
    };
    second_factor
        .verify(code.expose_secret(), &token)
        .await
        .context("Verification failed")?;

    let machine = auth.lock().await;
    if let Some(session) = machine.session() {
        info!(subject = %session.subject.id, "login complete");
        println!(
            "Logged in as {}.",
            session
                .subject
                .name
                .as_deref()
                .unwrap_or(&session.subject.id)
        );
    }
    Ok(())
}

/// # Errors
/// Returns an error if the session file cannot be removed.
pub async fn logout(globals: GlobalArgs) -> Result<()> {
    let auth = globals.restored_auth().await;
    auth.lock()
        .await
        .logout()
        .context("Could not remove the stored session")?;
    println!("Logged out.");
    Ok(())
}

/// Prints the restored session and the guard decision for each area.
pub async fn status(globals: GlobalArgs) -> Result<()> {
    let auth = globals.restored_auth().await;
    let machine = auth.lock().await;

    match machine.state() {
        AuthState::FullyAuthenticated(session) => {
            let kind = if machine.is_administrator() {
                "administrator"
            } else {
                "operator"
            };
            println!("Logged in as {} ({kind}).", session.subject.id);
            let granted: Vec<&str> = Capability::ALL
                .iter()
                .filter(|capability| machine.has_capability(**capability))
                .map(|capability| capability.as_str())
                .collect();
            println!("Capabilities: {}", granted.join(", "));
        }
        other => println!("Not logged in ({}).", other.name()),
    }

    for path in [paths::MENU, paths::DASHBOARD, paths::PHOTOS, paths::USERS] {
        let decision = match guard_path(&*machine, path) {
            GuardDecision::Allow => "allowed".to_string(),
            GuardDecision::RenderLoading => "loading".to_string(),
            GuardDecision::Redirect(target) => format!("redirects to {target}"),
        };
        println!("  {path:<14} {decision}");
    }
    Ok(())
}

/// Reads one trimmed line from stdin.
pub(crate) async fn prompt_line(label: &str) -> Result<String> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Could not read from stdin")?;
    Ok(line.trim().to_string())
}

/// Input is echoed; pass `--pin`/`--code` or the environment to avoid that.
async fn prompt_secret(label: &str) -> Result<SecretString> {
    let value = prompt_line(label).await?;
    debug!("read {} characters from stdin", value.len());
    Ok(SecretString::from(value))
}
