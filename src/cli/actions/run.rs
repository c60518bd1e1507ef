use crate::cli::actions::{Action, dashboard, register, session};
use anyhow::Result;

/// Execute the provided action.
// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Login(args) => session::login(args).await,
        Action::Logout(globals) => session::logout(globals).await,
        Action::Status(globals) => session::status(globals).await,
        Action::List(args) => dashboard::list(args).await,
        Action::Mutate(args) => dashboard::mutate(args).await,
        Action::Photo(args) => dashboard::photo(args).await,
        Action::Register(args) => register::execute(args).await,
    }
}
