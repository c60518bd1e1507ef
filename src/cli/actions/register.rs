use crate::cli::globals::GlobalArgs;
use crate::features::registrations::{RegistrationRequest, submit_registration};
use anyhow::{Context, Result};

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub request: RegistrationRequest,
}

/// Submits the public intake form; no session is needed.
///
/// # Errors
/// Returns an error if a field is invalid or the server rejects the form.
pub async fn execute(args: Args) -> Result<()> {
    let api = args.globals.api()?;
    let id = submit_registration(&api, &args.request)
        .await
        .context("Registration was not submitted")?;
    println!("Registration received: {id}");
    Ok(())
}
