use crate::cli::{actions::session::prompt_line, globals::GlobalArgs};
use crate::features::auth::{GuardDecision, guard, types::Capability};
use crate::features::registrations::{
    DataSyncController, ListItem, ListKind, ListSnapshot, MutationAction,
};
use crate::routes::{RouteRequirement, paths, requirement_for};
use anyhow::{Context, Result, anyhow, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug)]
pub struct ListArgs {
    pub globals: GlobalArgs,
    pub kind: ListKind,
    pub page: u32,
    pub filters: Vec<(String, String)>,
    pub summary: bool,
}

#[derive(Debug)]
pub struct MutateArgs {
    pub globals: GlobalArgs,
    pub kind: ListKind,
    pub action: MutationAction,
    pub id: String,
    pub page: u32,
    pub yes: bool,
}

#[derive(Debug)]
pub struct PhotoArgs {
    pub globals: GlobalArgs,
    pub id: String,
    pub output: Option<PathBuf>,
}

fn capability_for(kind: ListKind) -> Capability {
    match kind {
        ListKind::Pending => Capability::PendingRegistrations,
        ListKind::Submitted => Capability::SubmittedRegistrations,
        ListKind::Activities => Capability::Activities,
    }
}

/// Restores the session, applies the route guard and returns a controller
/// whose client carries the session token.
async fn controller(
    globals: &GlobalArgs,
    requirement: RouteRequirement,
) -> Result<DataSyncController> {
    let auth = globals.restored_auth().await;
    let machine = auth.lock().await;

    for requirement in [requirement_for(paths::DASHBOARD), requirement] {
        match guard(&*machine, &requirement) {
            GuardDecision::Allow => {}
            GuardDecision::Redirect(paths::LOGIN) => {
                bail!("Not logged in. Run `intake login` first.")
            }
            decision => bail!("This session cannot open that view ({decision:?})."),
        }
    }

    let token = machine
        .session()
        .map(|session| session.token.clone())
        .ok_or_else(|| anyhow!("Not logged in. Run `intake login` first."))?;
    let api = globals.api()?.with_bearer_token(token.expose());
    Ok(DataSyncController::new(Arc::new(api), &globals.config))
}

/// # Errors
/// Returns an error if access is denied, a filter is invalid or a fetch fails.
pub async fn list(args: ListArgs) -> Result<()> {
    let requirement = RouteRequirement::AnyOf(vec![capability_for(args.kind)]);
    let sync = controller(&args.globals, requirement).await?;

    for (field, value) in &args.filters {
        sync.set_filter(args.kind, field, value)?;
    }
    sync.apply_filters(args.kind)
        .await
        .with_context(|| format!("Could not load the {} list", args.kind))?;

    if args.page > 1 && !sync.set_page(args.kind, args.page).await? {
        let total = sync.snapshot(args.kind).pagination.total_pages;
        bail!("Page {} is out of range (1..={total}).", args.page);
    }

    if args.summary {
        let summary = sync.refresh_summary().await?;
        println!(
            "pending: {}  submitted: {}  activities: {}",
            summary.pending, summary.submitted, summary.activities
        );
    }
    print_snapshot(&sync.snapshot(args.kind));
    Ok(())
}

/// # Errors
/// Returns an error if access is denied, the item is not on the page, the
/// operator declines, or the server rejects the change.
pub async fn mutate(args: MutateArgs) -> Result<()> {
    let requirement = RouteRequirement::AnyOf(vec![capability_for(args.kind)]);
    let sync = controller(&args.globals, requirement).await?;
    sync.refresh(args.kind, Some(args.page))
        .await
        .with_context(|| format!("Could not load the {} list", args.kind))?;

    if !args.yes {
        let answer = prompt_line(&format!(
            "{} registration {}? [y/N] ",
            args.action.as_str(),
            args.id
        ))
        .await?;
        if !matches!(answer.to_lowercase().as_str(), "y" | "yes") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    sync.mutate(args.kind, args.action, &args.id).await?;
    let summary = sync.summary();
    println!(
        "Done: {} {}. pending: {}  submitted: {}",
        args.action.as_str(),
        args.id,
        summary.pending,
        summary.submitted
    );
    Ok(())
}

/// # Errors
/// Returns an error if access is denied or the photo cannot be fetched or written.
pub async fn photo(args: PhotoArgs) -> Result<()> {
    let sync = controller(&args.globals, requirement_for(paths::PHOTOS)).await?;
    let Some(photo) = sync.photo(&args.id).await? else {
        println!("Registration {} has no photo.", args.id);
        return Ok(());
    };

    match args.output {
        Some(path) => {
            tokio::fs::write(&path, photo.as_bytes())
                .await
                .with_context(|| format!("Could not write {}", path.display()))?;
            debug!(path = %path.display(), "photo written");
            println!("Saved to {}.", path.display());
        }
        None => println!("{photo}"),
    }
    Ok(())
}

fn print_snapshot(snapshot: &ListSnapshot) {
    for item in &snapshot.items {
        match item {
            ListItem::Registration(registration) => println!(
                "{:<12} {:<32} {}",
                registration.id,
                registration.full_name,
                registration.created_at.as_deref().unwrap_or("-")
            ),
            ListItem::Activity(activity) => println!(
                "{:<12} {:<32} {}",
                activity.id,
                activity.description,
                activity.status.as_deref().unwrap_or("-")
            ),
        }
    }
    if let Some(err) = &snapshot.last_error {
        eprintln!("Last refresh failed: {}", err.user_message());
    }
    println!(
        "{} list, page {}/{} ({} records)",
        snapshot.kind,
        snapshot.page,
        snapshot.pagination.total_pages.max(1),
        snapshot.pagination.total_records
    );
}
