mod conflict;
mod error;
mod gesture;
mod projection;
mod snapshot;
mod summary;
mod utilization;
mod window;

pub use conflict::{conflicts, find_conflicts, lane_conflicts};
pub use error::EngineError;
pub use gesture::{Gesture, GestureKind, PointerPos, snap};
pub use projection::{
    BoardColumn, TimelineBar, TimelineLane, VisibleSet, flat_list, resource_board, timeline, visible,
};
pub use snapshot::Snapshot;
pub use summary::{Summary, summarize};
pub use utilization::{
    DEFAULT_BOTTLENECK_THRESHOLD, MachineUtilization, UtilizationBand, machine_utilization,
    utilization, utilization_percent,
};
pub use window::{TimeWindow, ZoomLevel, start_of_day};

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::task::JoinError;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::filter::AssignmentFilter;
use crate::limits::check_span;
use crate::model::*;
use crate::notify::{ChangeNotice, Subscription};
use crate::repository::{AssignmentRepository, RepositoryError};

/// Per-session settings. Hosts usually build this from `Config`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoardSettings {
    pub zoom: ZoomLevel,
    pub utc_offset_minutes: i32,
    pub bottleneck_threshold: f64,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            zoom: ZoomLevel::Fine,
            utc_offset_minutes: 0,
            bottleneck_threshold: DEFAULT_BOTTLENECK_THRESHOLD,
        }
    }
}

/// Transient user-facing notification. Drained with [`Board::drain_notices`].
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A move or resize was rejected; `span` is the range already taken by `with`.
    Conflict {
        assignment: Ulid,
        machine_id: Ulid,
        with: Ulid,
        span: Span,
    },
    /// A save failed and the optimistic change was rolled back.
    PersistenceFailed {
        assignment: Ulid,
        error: RepositoryError,
    },
    /// A reload failed; the previous snapshot is still shown.
    LoadFailed { error: RepositoryError },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Dragging,
    Releasing,
}

enum GestureState {
    Idle,
    Dragging(Gesture),
    Releasing,
}

/// What a release did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Tentative state matched the original; nothing was sent.
    Unchanged,
    /// Applied optimistically; the save with this ticket is in flight.
    Pending(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Confirmed {
        ticket: u64,
        assignment: Assignment,
    },
    RolledBack {
        ticket: u64,
        assignment: Ulid,
        error: EngineError,
    },
}

impl CommitOutcome {
    pub fn ticket(&self) -> u64 {
        match self {
            CommitOutcome::Confirmed { ticket, .. } | CommitOutcome::RolledBack { ticket, .. } => {
                *ticket
            }
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, CommitOutcome::Confirmed { .. })
    }
}

/// Something the board handled in [`Board::next_activity`].
#[derive(Debug, Clone, PartialEq)]
pub enum Activity {
    Reloaded,
    ReloadFailed(EngineError),
    Committed(CommitOutcome),
}

struct PendingCommit {
    ticket: u64,
    previous: Assignment,
    optimistic: Assignment,
}

type CommitResult = (PendingCommit, Result<Result<Assignment, RepositoryError>, JoinError>);

async fn next_notice(subscription: &mut Option<Subscription>) -> Option<ChangeNotice> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}

/// One user's scheduling board over a shared repository.
///
/// Owned by a single task. Holds an unfiltered snapshot of the repository,
/// the time window, the filter and at most one gesture. Saves run as spawned
/// tasks; their results are folded back in by [`Board::next_activity`] or
/// [`Board::settle`].
pub struct Board {
    repo: Arc<dyn AssignmentRepository>,
    settings: BoardSettings,
    window: TimeWindow,
    filter: AssignmentFilter,
    cache: Snapshot,
    gesture: GestureState,
    collapsed: HashSet<Ulid>,
    notices: VecDeque<Notice>,
    in_flight: FuturesUnordered<BoxFuture<'static, CommitResult>>,
    subscription: Option<Subscription>,
    next_ticket: u64,
}

impl Board {
    /// Subscribes immediately; call [`Board::reload`] to fill the cache.
    pub fn new(repo: Arc<dyn AssignmentRepository>, settings: BoardSettings, now: Ms) -> Self {
        let subscription = repo.subscribe();
        Self {
            window: TimeWindow::with_utc_offset(now, settings.zoom, settings.utc_offset_minutes),
            repo,
            settings,
            filter: AssignmentFilter::all(),
            cache: Snapshot::default(),
            gesture: GestureState::Idle,
            collapsed: HashSet::new(),
            notices: VecDeque::new(),
            in_flight: FuturesUnordered::new(),
            subscription: Some(subscription),
            next_ticket: 0,
        }
    }

    /// Unsubscribe and drop the session. Saves still in flight finish on
    /// their own; their results are discarded.
    pub fn close(mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.unsubscribe();
        }
        info!("board closed with {} saves in flight", self.in_flight.len());
    }

    // ── Repository sync ──────────────────────────────────────

    /// Replace the cache wholesale with the repository's current contents.
    /// On failure the previous snapshot is kept and a notice is queued.
    pub async fn reload(&mut self) -> Result<(), EngineError> {
        let started = Instant::now();
        let loaded = async {
            let machines = self.repo.list_machines().await?;
            let assignments = self.repo.list_assignments(&AssignmentFilter::all()).await?;
            Ok::<_, RepositoryError>((machines, assignments))
        }
        .await;
        metrics::histogram!(crate::observability::RELOAD_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match loaded {
            Ok((machines, assignments)) => {
                metrics::counter!(crate::observability::RELOADS_TOTAL, "status" => "ok").increment(1);
                info!(
                    "reloaded {} machines, {} assignments",
                    machines.len(),
                    assignments.len()
                );
                self.cache = Snapshot::new(machines, assignments);
                Ok(())
            }
            Err(e) => {
                metrics::counter!(crate::observability::RELOADS_TOTAL, "status" => "error").increment(1);
                warn!("reload failed, keeping previous snapshot: {e}");
                self.notices.push_back(Notice::LoadFailed { error: e.clone() });
                Err(EngineError::Load(e))
            }
        }
    }

    /// Wait for the next change notification or finished save and handle it.
    ///
    /// A notification triggers one reload; notifications already queued
    /// behind it are folded into the same reload. Returns `None` once the
    /// subscription has ended and nothing is in flight.
    pub async fn next_activity(&mut self) -> Option<Activity> {
        loop {
            if self.subscription.is_none() && self.in_flight.is_empty() {
                return None;
            }
            tokio::select! {
                Some((pending, result)) = self.in_flight.next(), if !self.in_flight.is_empty() => {
                    return Some(Activity::Committed(self.settle_commit(pending, result)));
                }
                notice = next_notice(&mut self.subscription) => {
                    match notice {
                        Some(notice) => {
                            debug!("change notice: {notice:?}");
                            if let Some(sub) = self.subscription.as_mut() {
                                while sub.try_recv().is_some() {}
                            }
                            return Some(match self.reload().await {
                                Ok(()) => Activity::Reloaded,
                                Err(e) => Activity::ReloadFailed(e),
                            });
                        }
                        None => {
                            info!("change notifications ended");
                            self.subscription = None;
                        }
                    }
                }
            }
        }
    }

    /// Wait for every in-flight save and fold the results in.
    pub async fn settle(&mut self) -> Vec<CommitOutcome> {
        let mut outcomes = Vec::new();
        while let Some((pending, result)) = self.in_flight.next().await {
            outcomes.push(self.settle_commit(pending, result));
        }
        outcomes
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Confirm or roll back one save. Either way the cache is only touched
    /// while it still holds the optimistic value; a newer reload wins.
    fn settle_commit(
        &mut self,
        pending: PendingCommit,
        result: Result<Result<Assignment, RepositoryError>, JoinError>,
    ) -> CommitOutcome {
        let id = pending.optimistic.id;
        let untouched = self.cache.get(&id) == Some(&pending.optimistic);
        let error = match result {
            Ok(Ok(stored)) => {
                metrics::counter!(crate::observability::COMMITS_TOTAL, "outcome" => "confirmed")
                    .increment(1);
                info!("save {} confirmed for assignment {id}", pending.ticket);
                if untouched {
                    self.cache.replace(stored.clone());
                }
                return CommitOutcome::Confirmed {
                    ticket: pending.ticket,
                    assignment: stored,
                };
            }
            Ok(Err(e)) => e,
            Err(e) => RepositoryError::Unavailable(e.to_string()),
        };

        metrics::counter!(crate::observability::COMMITS_TOTAL, "outcome" => "rolled_back").increment(1);
        warn!("save {} failed for assignment {id}: {error}", pending.ticket);
        if untouched {
            self.cache.replace(pending.previous);
        }
        self.notices.push_back(Notice::PersistenceFailed {
            assignment: id,
            error: error.clone(),
        });
        CommitOutcome::RolledBack {
            ticket: pending.ticket,
            assignment: id,
            error: EngineError::Persistence(error),
        }
    }

    // ── Window & filter ──────────────────────────────────────

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    pub fn set_zoom(&mut self, zoom: ZoomLevel) {
        self.window.set_zoom(zoom);
    }

    pub fn zoom_in(&mut self) {
        self.window.set_zoom(self.window.zoom().finer());
    }

    pub fn zoom_out(&mut self) {
        self.window.set_zoom(self.window.zoom().coarser());
    }

    pub fn forward(&mut self) {
        self.window.forward();
    }

    pub fn backward(&mut self) {
        self.window.backward();
    }

    pub fn jump_to_now(&mut self, now: Ms) {
        self.window.jump_to(now);
    }

    pub fn filter(&self) -> &AssignmentFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: AssignmentFilter) -> Result<(), EngineError> {
        filter.validate().map_err(EngineError::Invalid)?;
        self.filter = filter;
        Ok(())
    }

    /// Flip a timeline lane between collapsed and expanded. Returns the new state.
    pub fn toggle_lane(&mut self, machine_id: Ulid) -> bool {
        if self.collapsed.remove(&machine_id) {
            false
        } else {
            self.collapsed.insert(machine_id);
            true
        }
    }

    pub fn is_collapsed(&self, machine_id: &Ulid) -> bool {
        self.collapsed.contains(machine_id)
    }

    // ── Projections ──────────────────────────────────────────

    pub fn snapshot(&self) -> &Snapshot {
        &self.cache
    }

    pub fn visible(&self) -> VisibleSet<'_> {
        visible(&self.cache, &self.filter, &self.window.span())
    }

    pub fn timeline(&self) -> Vec<TimelineLane<'_>> {
        timeline(&self.visible(), &self.window, &self.collapsed)
    }

    pub fn resource_board(&self) -> Vec<BoardColumn<'_>> {
        resource_board(&self.visible())
    }

    pub fn flat_list(&self) -> Vec<&Assignment> {
        flat_list(&self.visible())
    }

    pub fn utilization(&self) -> Vec<MachineUtilization> {
        let set = self.visible();
        let result = utilization(
            &set.machines,
            &set.assignments,
            &self.window.span(),
            self.settings.bottleneck_threshold,
        );
        let bottlenecks = result.iter().filter(|u| u.bottleneck).count();
        metrics::gauge!(crate::observability::BOTTLENECK_MACHINES).set(bottlenecks as f64);
        result
    }

    /// Summary of the visible set; "today" is the calendar day containing `now`.
    pub fn summary(&self, now: Ms) -> Summary {
        let set = self.visible();
        let utilization = self.utilization();
        summarize(&set.assignments, &utilization, &self.window.day_containing(now))
    }

    /// Would `span` on `machine_id` collide with active work? Checked against
    /// the unfiltered cache.
    pub fn is_conflicting(&self, machine_id: Ulid, span: &Span, exclude: Option<Ulid>) -> bool {
        self.cache
            .lane(&machine_id)
            .is_some_and(|lane| lane_conflicts(lane, span, exclude))
    }

    // ── Gestures ─────────────────────────────────────────────

    pub fn phase(&self) -> GesturePhase {
        match self.gesture {
            GestureState::Idle => GesturePhase::Idle,
            GestureState::Dragging(_) => GesturePhase::Dragging,
            GestureState::Releasing => GesturePhase::Releasing,
        }
    }

    pub fn gesture(&self) -> Option<&Gesture> {
        match &self.gesture {
            GestureState::Dragging(g) => Some(g),
            _ => None,
        }
    }

    /// Pick up an assignment. Only scheduled, running and paused work can move.
    pub fn begin_gesture(&mut self, id: Ulid, kind: GestureKind, origin: PointerPos) -> Result<(), EngineError> {
        if !matches!(self.gesture, GestureState::Idle) {
            return Err(EngineError::GestureInProgress);
        }
        let assignment = self.editable(id)?.clone();
        debug!("begin {kind:?} on {id}");
        self.gesture = GestureState::Dragging(Gesture::begin(kind, assignment, origin));
        Ok(())
    }

    /// Update the tentative placement. Returns the tentative machine and span.
    pub fn drag_to(&mut self, pos: PointerPos) -> Result<(Ulid, Span), EngineError> {
        let GestureState::Dragging(gesture) = &mut self.gesture else {
            return Err(EngineError::NoGesture);
        };
        gesture.drag_to(pos, &self.window);
        Ok((gesture.tentative_machine(), gesture.tentative_span()))
    }

    /// Drop the gesture with no side effects. Returns whether one was active.
    pub fn cancel_gesture(&mut self) -> bool {
        match std::mem::replace(&mut self.gesture, GestureState::Idle) {
            GestureState::Dragging(g) => {
                debug!("cancelled {:?} on {}", g.kind(), g.assignment_id());
                true
            }
            _ => false,
        }
    }

    /// Validate the tentative placement against the current cache and, if it
    /// holds, apply it optimistically and start the save.
    pub fn release(&mut self) -> Result<Release, EngineError> {
        let gesture = match std::mem::replace(&mut self.gesture, GestureState::Releasing) {
            GestureState::Dragging(g) => g,
            other => {
                self.gesture = other;
                return Err(EngineError::NoGesture);
            }
        };
        let result = self.commit(gesture.assignment_id(), gesture.kind(), gesture.patch());
        self.gesture = GestureState::Idle;
        result
    }

    /// Resource-board drop: move to `machine_id`, keeping the interval.
    pub fn drop_on_column(&mut self, id: Ulid, machine_id: Ulid) -> Result<Release, EngineError> {
        if !matches!(self.gesture, GestureState::Idle) {
            return Err(EngineError::GestureInProgress);
        }
        let current = self.editable(id)?;
        let patch = AssignmentPatch {
            machine_id: (current.machine_id != machine_id).then_some(machine_id),
            span: None,
        };
        self.commit(id, GestureKind::Move, patch)
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    fn editable(&self, id: Ulid) -> Result<&Assignment, EngineError> {
        let assignment = self.cache.get(&id).ok_or(EngineError::NotFound(id))?;
        if !assignment.is_active() {
            return Err(EngineError::NotEditable {
                id,
                status: assignment.status,
            });
        }
        Ok(assignment)
    }

    fn commit(&mut self, id: Ulid, kind: GestureKind, patch: AssignmentPatch) -> Result<Release, EngineError> {
        if patch.is_empty() {
            debug!("release of {id} left it unchanged");
            return Ok(Release::Unchanged);
        }

        // The cache may have been reloaded while dragging: re-read it.
        let current = self.editable(id)?.clone();
        let mut optimistic = current.clone();
        patch.apply(&mut optimistic);

        check_span(&optimistic.span).map_err(EngineError::Invalid)?;
        if self.cache.machine(&optimistic.machine_id).is_none() {
            return Err(EngineError::NotFound(optimistic.machine_id));
        }
        let hits = self
            .cache
            .conflicts_with(&optimistic.machine_id, &optimistic.span, Some(optimistic.id));
        if let Some(hit) = hits.first() {
            metrics::counter!(crate::observability::CONFLICTS_REJECTED_TOTAL).increment(1);
            warn!(
                "rejected {:?} of {}: overlaps {} on machine {}",
                kind,
                optimistic.id,
                hit.id,
                optimistic.machine_id
            );
            self.notices.push_back(Notice::Conflict {
                assignment: optimistic.id,
                machine_id: optimistic.machine_id,
                with: hit.id,
                span: hit.span,
            });
            return Err(EngineError::Conflict {
                assignment: optimistic.id,
                with: hit.id,
                span: hit.span,
            });
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.cache.replace(optimistic.clone());
        debug!("save {ticket}: {} -> {:?}", optimistic.id, patch);

        let repo = self.repo.clone();
        let handle = tokio::spawn(async move { repo.update_assignment(id, patch).await });
        let pending = PendingCommit {
            ticket,
            previous: current,
            optimistic,
        };
        self.in_flight
            .push(async move { (pending, handle.await) }.boxed());
        Ok(Release::Pending(ticket))
    }
}
