//! Paginated, filterable view over the dashboard lists with optimistic
//! mutations.
//!
//! Flow Overview:
//! 1) `set_filter` resets the page to 1 and schedules one fetch after the
//!    debounce window. A newer change aborts the scheduled task.
//! 2) Every fetch takes a generation tag; a result whose tag is no longer the
//!    latest for its list is discarded.
//! 3) `mutate` removes the item locally, calls the API, and either refreshes
//!    counters, source list and destination list in that order, or restores
//!    the exact pre-mutation working copy. When a server page landed while
//!    the request was out, that page is kept and reloaded instead.
//!
//! Only one mutation may be unconfirmed at a time, so the working copy is never
//! the composition of two optimistic deltas. No lock is held across a request.

use crate::app_lib::{AppConfig, AppError};
use crate::features::registrations::{
    client::RegistrationsApi,
    types::{ListItem, ListKind, ListPage, MutationAction, PageQuery, Pagination, SummaryCounters},
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    App(#[from] AppError),
    #[error("A change to {id} is already in progress")]
    MutationInFlight { id: String },
    #[error("Another change ({pending_id}) is still in progress")]
    Busy { pending_id: String },
    #[error("{id} is not on the current {kind} page")]
    UnknownItem { kind: ListKind, id: String },
}

/// Per-item mutation state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MutationState {
    #[default]
    Idle,
    InFlight,
    RolledBack,
}

/// Read-only copy of one list for rendering.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListSnapshot {
    pub kind: ListKind,
    pub items: Vec<ListItem>,
    pub page: u32,
    pub pagination: Pagination,
    pub filters: BTreeMap<String, String>,
    pub loading: bool,
    pub last_error: Option<AppError>,
    pub scroll_offset: u64,
}

#[derive(Default)]
struct ListState {
    items: Vec<ListItem>,
    page: u32,
    pagination: Pagination,
    filters: BTreeMap<String, String>,
    generation: u64,
    /// Count of fetch results written to `items`.
    applied: u64,
    in_flight: usize,
    last_error: Option<AppError>,
    scroll_offset: u64,
    debounce: Option<JoinHandle<()>>,
    debounce_generation: u64,
}

impl ListState {
    fn new() -> Self {
        Self {
            page: 1,
            ..Self::default()
        }
    }

    fn cancel_debounce(&mut self) {
        if let Some(task) = self.debounce.take() {
            task.abort();
        }
    }
}

struct PendingMutation {
    kind: ListKind,
    id: String,
    working_copy: Vec<ListItem>,
    applied: u64,
}

enum Rollback {
    /// The pre-mutation copy is back in place.
    Restored,
    /// A server page landed mid-request and was kept.
    Superseded(ListKind),
}

struct Inner {
    lists: BTreeMap<ListKind, ListState>,
    summary: SummaryCounters,
    pending: Option<PendingMutation>,
    item_states: HashMap<String, MutationState>,
    photos: HashMap<String, Option<String>>,
}

impl Inner {
    fn list(&mut self, kind: ListKind) -> &mut ListState {
        self.lists.entry(kind).or_insert_with(ListState::new)
    }

    /// Marks a fetch as started and returns the query plus its generation tag.
    fn begin_fetch(&mut self, kind: ListKind, page: u32, page_size: u32) -> (PageQuery, u64) {
        let list = self.list(kind);
        list.generation += 1;
        list.in_flight += 1;
        let query = PageQuery {
            kind,
            page: page.max(1),
            page_size,
            filters: list.filters.clone(),
        };
        (query, list.generation)
    }

    /// Applies a fetch result unless a newer query superseded it.
    fn finish_fetch(
        &mut self,
        query: &PageQuery,
        generation: u64,
        result: Result<ListPage, AppError>,
    ) -> Result<bool, AppError> {
        let list = self.list(query.kind);
        list.in_flight = list.in_flight.saturating_sub(1);
        if list.generation != generation {
            debug!(kind = %query.kind, page = query.page, "discarding stale page");
            return Ok(false);
        }
        match result {
            Ok(page) => {
                list.items = page.items;
                list.page = if page.pagination.current_page == 0 {
                    query.page
                } else {
                    page.pagination.current_page
                };
                list.pagination = page.pagination;
                list.applied += 1;
                list.last_error = None;
                Ok(true)
            }
            Err(err) => {
                list.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Undoes the unconfirmed mutation. The old working copy only comes back
    /// when no server page was applied since the optimistic removal.
    fn roll_back(&mut self) -> Option<Rollback> {
        let pending = self.pending.take()?;
        self.item_states
            .insert(pending.id, MutationState::RolledBack);
        let list = self.list(pending.kind);
        // Fetches issued against the optimistic copy must not land.
        list.generation += 1;
        if list.applied == pending.applied {
            list.items = pending.working_copy;
            Some(Rollback::Restored)
        } else {
            Some(Rollback::Superseded(pending.kind))
        }
    }
}

/// Keeps the pending mutation tied to the `mutate` future: if that future is
/// dropped before the server answers, the optimistic change is undone, and
/// once confirmed the pending slot is released even if the follow-up
/// refreshes are cut short.
struct PendingGuard<'a> {
    inner: &'a Mutex<Inner>,
    confirmed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = lock(self.inner);
        if self.confirmed {
            inner.pending = None;
        } else if inner.roll_back().is_some() {
            warn!("mutation abandoned before the server answered; rolled back");
        }
    }
}

/// Fetches one page and stores it if still current.
async fn load_page(
    api: &dyn RegistrationsApi,
    inner: &Mutex<Inner>,
    kind: ListKind,
    page: u32,
    page_size: u32,
) -> Result<bool, AppError> {
    let (query, generation) = lock(inner).begin_fetch(kind, page, page_size);
    let result = api.fetch_page(&query).await;
    lock(inner).finish_fetch(&query, generation, result)
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DataSyncController {
    api: Arc<dyn RegistrationsApi>,
    inner: Arc<Mutex<Inner>>,
    page_size: u32,
    debounce: Duration,
}

impl DataSyncController {
    pub fn new(api: Arc<dyn RegistrationsApi>, config: &AppConfig) -> Self {
        Self {
            api,
            inner: Arc::new(Mutex::new(Inner {
                lists: ListKind::ALL
                    .iter()
                    .map(|kind| (*kind, ListState::new()))
                    .collect(),
                summary: SummaryCounters::default(),
                pending: None,
                item_states: HashMap::new(),
                photos: HashMap::new(),
            })),
            page_size: config.page_size.max(1),
            debounce: config.debounce,
        }
    }

    #[must_use]
    pub fn snapshot(&self, kind: ListKind) -> ListSnapshot {
        let mut inner = self.lock();
        let list = inner.list(kind);
        ListSnapshot {
            kind,
            items: list.items.clone(),
            page: list.page,
            pagination: list.pagination,
            filters: list.filters.clone(),
            loading: list.in_flight > 0,
            last_error: list.last_error.clone(),
            scroll_offset: list.scroll_offset,
        }
    }

    #[must_use]
    pub fn summary(&self) -> SummaryCounters {
        self.lock().summary
    }

    #[must_use]
    pub fn mutation_state(&self, id: &str) -> MutationState {
        self.lock().item_states.get(id).copied().unwrap_or_default()
    }

    /// Records the view's scroll position so snapshots can restore it.
    pub fn set_scroll(&self, kind: ListKind, offset: u64) {
        self.lock().list(kind).scroll_offset = offset;
    }

    /// Updates one filter field and schedules a debounced fetch of page 1.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// `AppError::Validation` when `field` is not a filter of `kind`.
    pub fn set_filter(&self, kind: ListKind, field: &str, value: &str) -> Result<(), SyncError> {
        if !kind.filter_fields().contains(&field) {
            return Err(AppError::validation(field, "Unknown filter for this list.").into());
        }

        let mut inner = self.lock();
        let list = inner.list(kind);
        let value = value.trim();
        if value.is_empty() {
            list.filters.remove(field);
        } else {
            list.filters.insert(field.to_string(), value.to_string());
        }
        list.page = 1;
        // Anything already in flight now answers an outdated query.
        list.generation += 1;
        list.cancel_debounce();
        list.debounce_generation += 1;

        let token = list.debounce_generation;
        let api = Arc::clone(&self.api);
        let shared = Arc::clone(&self.inner);
        let (debounce, page_size) = (self.debounce, self.page_size);
        list.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let (query, generation) = {
                let mut inner = lock(&shared);
                let list = inner.list(kind);
                if list.debounce_generation != token {
                    return;
                }
                list.debounce = None;
                inner.begin_fetch(kind, 1, page_size)
            };
            debug!(%kind, "debounced fetch");
            let result = api.fetch_page(&query).await;
            if let Err(err) = lock(&shared).finish_fetch(&query, generation, result) {
                warn!(%kind, "filtered fetch failed: {err}");
            }
        }));
        Ok(())
    }

    /// Fetches page 1 with the current filters now, cancelling any scheduled
    /// debounced fetch. Used when the filter form is submitted explicitly.
    ///
    /// # Errors
    /// The API error when the fetch fails.
    pub async fn apply_filters(&self, kind: ListKind) -> Result<bool, SyncError> {
        {
            let mut inner = self.lock();
            let list = inner.list(kind);
            list.cancel_debounce();
            list.debounce_generation += 1;
            list.scroll_offset = 0;
        }
        self.refresh(kind, Some(1)).await
    }

    /// Moves to page `page`. Returns `false` when the request was ignored
    /// because the page is out of range or a fetch is already running.
    ///
    /// # Errors
    /// The API error when the fetch fails.
    #[instrument(skip(self))]
    pub async fn set_page(&self, kind: ListKind, page: u32) -> Result<bool, SyncError> {
        {
            let mut inner = self.lock();
            let list = inner.list(kind);
            if page < 1 || page > list.pagination.total_pages || list.in_flight > 0 {
                debug!("page change ignored");
                return Ok(false);
            }
            list.scroll_offset = 0;
        }
        Ok(load_page(self.api.as_ref(), &self.inner, kind, page, self.page_size).await?)
    }

    /// Forced fetch of `page` (or the current page), even if another fetch is
    /// running. Returns whether the result was applied.
    ///
    /// # Errors
    /// The API error when the fetch fails.
    #[instrument(skip(self))]
    pub async fn refresh(&self, kind: ListKind, page: Option<u32>) -> Result<bool, SyncError> {
        let page = match page {
            Some(page) => page,
            None => self.lock().list(kind).page,
        };
        Ok(load_page(self.api.as_ref(), &self.inner, kind, page, self.page_size).await?)
    }

    /// Reloads the dashboard counters.
    ///
    /// # Errors
    /// The API error when the request fails; the previous counters are kept.
    #[instrument(skip(self))]
    pub async fn refresh_summary(&self) -> Result<SummaryCounters, SyncError> {
        let summary = self.api.fetch_summary().await?;
        self.lock().summary = summary;
        Ok(summary)
    }

    /// Photo for a registration, fetched once and cached.
    ///
    /// # Errors
    /// The API error when the photo cannot be fetched; failures are not cached.
    pub async fn photo(&self, id: &str) -> Result<Option<String>, SyncError> {
        if let Some(photo) = self.lock().photos.get(id) {
            return Ok(photo.clone());
        }
        let photo = self.api.fetch_photo(id).await?;
        self.lock().photos.insert(id.to_string(), photo.clone());
        Ok(photo)
    }

    /// Applies `action` to `id` optimistically.
    ///
    /// Confirmation is the caller's job. On success the summary, the source
    /// list (current page) and the destination list (page 1) are refreshed in
    /// that order; refresh failures are logged and kept on the list snapshot.
    ///
    /// # Errors
    /// `AppError::Validation` when the action does not apply to `kind`,
    /// `MutationInFlight`/`Busy` while another change is unconfirmed,
    /// `UnknownItem` when `id` is not on the page, and the API error after the
    /// working copy has been rolled back. Dropping the future before the
    /// server answers rolls back too.
    #[instrument(skip(self), fields(action = action.as_str()))]
    pub async fn mutate(
        &self,
        kind: ListKind,
        action: MutationAction,
        id: &str,
    ) -> Result<(), SyncError> {
        if !action.accepts_source(kind) {
            return Err(AppError::validation(
                "action",
                &format!("Cannot {} from the {kind} list.", action.as_str()),
            )
            .into());
        }

        {
            let mut inner = self.lock();
            if let Some(pending) = &inner.pending {
                return Err(if pending.id == id {
                    SyncError::MutationInFlight { id: id.to_string() }
                } else {
                    SyncError::Busy {
                        pending_id: pending.id.clone(),
                    }
                });
            }
            let list = inner.list(kind);
            let Some(index) = list.items.iter().position(|item| item.id() == id) else {
                return Err(SyncError::UnknownItem {
                    kind,
                    id: id.to_string(),
                });
            };
            let working_copy = list.items.clone();
            list.items.remove(index);
            // Pages requested before the removal would resurrect the item.
            list.generation += 1;
            let applied = list.applied;
            inner.pending = Some(PendingMutation {
                kind,
                id: id.to_string(),
                working_copy,
                applied,
            });
            inner
                .item_states
                .insert(id.to_string(), MutationState::InFlight);
        }
        let mut guard = PendingGuard {
            inner: self.inner.as_ref(),
            confirmed: false,
        };

        if let Err(err) = self.api.apply(action, id).await {
            let rollback = self.lock().roll_back();
            warn!(%kind, "mutation rolled back: {err}");
            if let Some(Rollback::Superseded(kind)) = rollback
                && let Err(refresh_err) = self.refresh(kind, None).await
            {
                warn!(%kind, "reload after rollback failed: {refresh_err}");
            }
            return Err(err.into());
        }

        guard.confirmed = true;
        {
            let mut inner = self.lock();
            inner.item_states.insert(id.to_string(), MutationState::Idle);
            if action == MutationAction::Delete {
                inner.photos.remove(id);
            }
        }
        info!(%kind, "mutation confirmed");

        self.refresh_after_mutation(kind, action).await;
        Ok(())
    }

    /// Summary first, then the source list, then the destination list.
    async fn refresh_after_mutation(&self, kind: ListKind, action: MutationAction) {
        if let Err(err) = self.refresh_summary().await {
            warn!("summary refresh failed: {err}");
        }

        if let Err(err) = self.refresh(kind, None).await {
            warn!(%kind, "source refresh failed: {err}");
        } else {
            self.step_back_if_page_emptied(kind).await;
        }

        if let Some(destination) = action.destination()
            && let Err(err) = self.refresh(destination, Some(1)).await
        {
            warn!(kind = %destination, "destination refresh failed: {err}");
        }
    }

    /// Removing the only row of the last page leaves the view past the end.
    async fn step_back_if_page_emptied(&self, kind: ListKind) {
        let last_page = {
            let mut inner = self.lock();
            let list = inner.list(kind);
            let total = list.pagination.total_pages;
            (list.items.is_empty() && total >= 1 && list.page > total).then_some(total)
        };
        if let Some(page) = last_page
            && let Err(err) = self.refresh(kind, Some(page)).await
        {
            warn!(%kind, "refresh of last page failed: {err}");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

impl Drop for DataSyncController {
    fn drop(&mut self) {
        for list in self.lock().lists.values_mut() {
            list.cancel_debounce();
        }
    }
}
