use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{info, warn};
use ulid::Ulid;

use crate::filter::AssignmentFilter;
use crate::journal::Journal;
use crate::model::*;
use crate::notify::{NotifyHub, Subscription};

use super::{AssignmentRepository, InMemoryStore, RepositoryError};

// ── Group-commit journal channel ─────────────────────────

enum JournalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain every Append already queued behind it.
/// 3. One flush_sync for the whole batch, then answer every sender.
async fn journal_writer_loop(mut journal: Journal, mut rx: mpsc::Receiver<JournalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            JournalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut journal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(JournalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        flush_and_respond(&mut journal, batch);
        if let Some(other) = deferred {
            handle_non_append(&mut journal, other);
        }
    }
}

fn flush_and_respond(journal: &mut Journal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::JOURNAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let mut append_err: Option<io::Error> = None;
    for (event, _) in &batch {
        if let Err(e) = journal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so half-buffered bytes don't leak into the next batch.
    let flush_err = journal.flush_sync().err();
    let result = match append_err.or(flush_err) {
        Some(e) => Err(e),
        None => Ok(()),
    };

    metrics::histogram!(crate::observability::JOURNAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(journal: &mut Journal, cmd: JournalCommand) {
    match cmd {
        JournalCommand::Compact { events, response } => {
            let result = Journal::write_compact_file(journal.path(), &events)
                .and_then(|()| journal.swap_compact_file());
            let _ = response.send(result);
        }
        JournalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(journal.appends_since_compact());
        }
        JournalCommand::Append { event, response } => {
            flush_and_respond(journal, vec![(event, response)]);
        }
    }
}

/// The crate's own assignment store: validation, optional durability, notifications.
///
/// Besides the [`AssignmentRepository`] surface used by the board, it exposes
/// the collaborator operations that create assignments and move them through
/// their status lifecycle.
pub struct ScheduleStore {
    store: InMemoryStore,
    notify: Arc<NotifyHub>,
    journal_tx: Option<mpsc::Sender<JournalCommand>>,
    /// Serializes check → persist → apply so validation sees committed state.
    write_lock: Mutex<()>,
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl ScheduleStore {
    /// A volatile store. Nothing survives the process.
    pub fn in_memory() -> Self {
        Self {
            store: InMemoryStore::new(),
            notify: Arc::new(NotifyHub::new()),
            journal_tx: None,
            write_lock: Mutex::new(()),
        }
    }

    /// Open (or create) a journal-backed store, replaying what is on disk.
    /// Must be called inside a Tokio runtime: the journal writer is spawned here.
    pub fn open(path: &Path) -> io::Result<Self> {
        let replay = Journal::replay(path)?;
        if replay.damaged_tail {
            warn!(
                "journal {} has a damaged tail; truncating to {} bytes",
                path.display(),
                replay.valid_len
            );
            Journal::truncate(path, replay.valid_len)?;
        }
        let journal = Journal::open(path)?;
        let (journal_tx, journal_rx) = mpsc::channel(4096);
        tokio::spawn(journal_writer_loop(journal, journal_rx));

        let store = InMemoryStore::new();
        for event in &replay.events {
            store.apply_event(event);
        }
        info!(
            "opened journal {}: {} machines, {} assignments ({} records)",
            path.display(),
            store.machine_count(),
            store.assignment_count(),
            replay.events.len()
        );

        Ok(Self {
            store,
            notify: Arc::new(NotifyHub::new()),
            journal_tx: Some(journal_tx),
            write_lock: Mutex::new(()),
        })
    }

    pub fn is_durable(&self) -> bool {
        self.journal_tx.is_some()
    }

    pub fn store(&self) -> &InMemoryStore {
        &self.store
    }

    /// Live change subscriptions, boards included.
    pub fn subscriber_count(&self) -> usize {
        self.notify.subscriber_count()
    }

    async fn journal_append(&self, event: &Event) -> Result<(), RepositoryError> {
        let Some(journal_tx) = &self.journal_tx else {
            return Ok(());
        };
        let (tx, rx) = oneshot::channel();
        journal_tx
            .send(JournalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| RepositoryError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| RepositoryError::Journal("journal writer dropped response".into()))?
            .map_err(|e| RepositoryError::Journal(e.to_string()))
    }

    /// Check + journal + apply + notify in one call.
    async fn commit(&self, event: Event) -> Result<(), RepositoryError> {
        self.commit_with(|_| Ok(event)).await
    }

    /// Like [`commit`](Self::commit), but the event is built from the state
    /// seen under the write lock.
    async fn commit_with(
        &self,
        build: impl FnOnce(&InMemoryStore) -> Result<Event, RepositoryError>,
    ) -> Result<(), RepositoryError> {
        let _guard = self.write_lock.lock().await;
        let event = build(&self.store)?;
        self.store.check_event(&event)?;
        self.journal_append(&event).await?;
        self.store.apply_event(&event);
        self.notify.send(&event);
        Ok(())
    }

    // ── Collaborator operations ──────────────────────────────

    pub async fn register_machine(&self, machine: Machine) -> Result<(), RepositoryError> {
        self.commit(Event::MachineRegistered(machine)).await
    }

    pub async fn create_assignment(&self, assignment: Assignment) -> Result<(), RepositoryError> {
        self.commit(Event::AssignmentCreated(assignment)).await
    }

    pub async fn set_status(
        &self,
        id: Ulid,
        status: AssignmentStatus,
    ) -> Result<(), RepositoryError> {
        self.commit(Event::StatusChanged { id, status }).await
    }

    pub async fn delete_assignment(&self, id: Ulid) -> Result<(), RepositoryError> {
        self.commit(Event::AssignmentDeleted { id }).await
    }

    // ── Journal maintenance ──────────────────────────────────

    /// Rewrite the journal with only the records needed to recreate the current state.
    /// No-op for in-memory stores.
    pub async fn compact(&self) -> Result<(), RepositoryError> {
        let Some(journal_tx) = &self.journal_tx else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;
        let events = self.store.snapshot_events();
        let (tx, rx) = oneshot::channel();
        journal_tx
            .send(JournalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| RepositoryError::Journal("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| RepositoryError::Journal("journal writer dropped response".into()))?
            .map_err(|e| RepositoryError::Journal(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let Some(journal_tx) = &self.journal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if journal_tx
            .send(JournalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl AssignmentRepository for ScheduleStore {
    async fn list_machines(&self) -> Result<Vec<Machine>, RepositoryError> {
        Ok(self.store.machines())
    }

    async fn list_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<Assignment>, RepositoryError> {
        filter.validate().map_err(RepositoryError::Invalid)?;
        Ok(self.store.assignments(filter))
    }

    async fn update_assignment(
        &self,
        id: Ulid,
        patch: AssignmentPatch,
    ) -> Result<Assignment, RepositoryError> {
        // Fields the patch leaves alone keep whatever a concurrent writer committed.
        let mut updated = None;
        self.commit_with(|store| {
            let mut next = store
                .get_assignment(&id)
                .ok_or(RepositoryError::NotFound(id))?;
            patch.apply(&mut next);
            let event = Event::AssignmentUpdated {
                id,
                machine_id: next.machine_id,
                span: next.span,
            };
            updated = Some(next);
            Ok(event)
        })
        .await?;
        updated.ok_or(RepositoryError::NotFound(id))
    }

    fn subscribe(&self) -> Subscription {
        self.notify.subscribe()
    }
}
