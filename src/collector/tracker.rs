use crate::collector::sampler::Sample;
use crate::db::{IntervalKind, IntervalWriter, NewInterval, StoreError};
use std::mem;
use tracing::{debug, info, warn};

pub const IDLE_LABEL: &str = "Idle";
pub const UNKNOWN_LABEL: &str = "unknown";

/// What a single observation did to the focus stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Opened {
        kind: IntervalKind,
        label: String,
        closed_duration: Option<i64>,
    },
    Refreshed {
        duration_seconds: i64,
    },
    Nothing,
}

#[derive(Debug, Clone)]
struct OpenInterval {
    // None until the store has confirmed the insert.
    id: Option<i64>,
    started_at: i64,
    kind: IntervalKind,
    label: String,
    detail: String,
    duration_seconds: i64,
}

impl OpenInterval {
    fn matches(&self, kind: &IntervalKind, label: &str) -> bool {
        self.kind == *kind && self.label == label
    }

    fn to_new_interval(&self) -> NewInterval {
        NewInterval {
            started_at: self.started_at,
            kind: self.kind.clone(),
            label: self.label.clone(),
            detail: self.detail.clone(),
            duration_seconds: self.duration_seconds,
        }
    }
}

/// A store write that failed and is replayed on the next observation.
///
/// A replayed `Insert` gets its row id only when it lands, so it can end up
/// with a larger id than the interval that followed it. Reads order by `ts`.
#[derive(Debug, Clone)]
enum PendingWrite {
    Close { id: i64, duration_seconds: i64 },
    Insert(NewInterval),
}

/// Turns focus/idle samples into non-overlapping intervals of one stream.
///
/// Owned by the polling loop. Store failures never lose the in-memory open
/// interval: a failed insert is retried while the interval stays open, and a
/// failed close is queued and replayed on the next observation.
#[derive(Debug)]
pub struct Tracker {
    idle_threshold_seconds: u64,
    open: Option<OpenInterval>,
    pending: Vec<PendingWrite>,
}

impl Tracker {
    pub fn new(idle_threshold_seconds: u64) -> Self {
        Self {
            idle_threshold_seconds,
            open: None,
            pending: Vec::new(),
        }
    }

    pub fn open_id(&self) -> Option<i64> {
        self.open.as_ref().and_then(|open| open.id)
    }

    pub fn open_label(&self) -> Option<&str> {
        self.open.as_ref().map(|open| open.label.as_str())
    }

    pub fn open_started_at(&self) -> Option<i64> {
        self.open.as_ref().map(|open| open.started_at)
    }

    pub fn is_idle(&self) -> bool {
        self.open
            .as_ref()
            .is_some_and(|open| open.kind.is_idle())
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    pub fn observe<W>(&mut self, store: &W, ts: i64, sample: Sample) -> Transition
    where
        W: IntervalWriter + ?Sized,
    {
        self.replay_pending(store);
        let ts = self.clamp(ts);

        let target = match sample {
            Sample::Idle { idle_seconds } if idle_seconds >= self.idle_threshold_seconds => Some((
                IntervalKind::Idle,
                IDLE_LABEL.to_string(),
                format!("idle_seconds:{idle_seconds}"),
            )),
            // Below threshold the user is still at the same window.
            Sample::Idle { .. } => None,
            Sample::Active { label, detail } => {
                Some((IntervalKind::Window, resolve_label(&label), detail))
            }
        };

        match target {
            Some((kind, label, detail))
                if !self
                    .open
                    .as_ref()
                    .is_some_and(|open| open.matches(&kind, &label)) =>
            {
                let closed_duration = self.close_open(store, ts);
                self.open_new(store, ts, kind.clone(), label.clone(), detail);

                Transition::Opened {
                    kind,
                    label,
                    closed_duration,
                }
            }
            _ => self.refresh(store, ts),
        }
    }

    /// Final duration write for the open interval. Returns the number of
    /// writes that still could not be committed.
    pub fn flush<W>(&mut self, store: &W, ts: i64) -> usize
    where
        W: IntervalWriter + ?Sized,
    {
        self.replay_pending(store);
        let ts = self.clamp(ts);
        self.refresh(store, ts);
        self.pending.len()
    }

    // Time never runs backwards inside the stream.
    fn clamp(&self, ts: i64) -> i64 {
        self.open
            .as_ref()
            .map(|open| ts.max(open.started_at + open.duration_seconds))
            .unwrap_or(ts)
    }

    fn refresh<W>(&mut self, store: &W, ts: i64) -> Transition
    where
        W: IntervalWriter + ?Sized,
    {
        let Some(open) = self.open.as_mut() else {
            return Transition::Nothing;
        };

        open.duration_seconds = (ts - open.started_at).max(open.duration_seconds);
        let duration_seconds = open.duration_seconds;

        match open.id {
            Some(id) => match store.update_duration(id, duration_seconds) {
                Ok(()) => {}
                Err(StoreError::NotFound(id)) => {
                    warn!(id, "open interval vanished from the store; update dropped");
                }
                Err(error) => {
                    warn!(id, error = %error, "duration refresh failed; retrying next tick");
                }
            },
            None => match store.append(&open.to_new_interval()) {
                Ok(id) => {
                    debug!(id, label = %open.label, "open interval persisted on retry");
                    open.id = Some(id);
                }
                Err(error) => {
                    warn!(label = %open.label, error = %error, "insert retry failed; retrying next tick");
                }
            },
        }

        Transition::Refreshed { duration_seconds }
    }

    fn close_open<W>(&mut self, store: &W, ts: i64) -> Option<i64>
    where
        W: IntervalWriter + ?Sized,
    {
        let mut open = self.open.take()?;
        open.duration_seconds = (ts - open.started_at).max(open.duration_seconds);

        let write = match open.id {
            Some(id) => PendingWrite::Close {
                id,
                duration_seconds: open.duration_seconds,
            },
            None => PendingWrite::Insert(open.to_new_interval()),
        };
        self.apply(store, write);

        info!(
            kind = %open.kind,
            label = %open.label,
            duration_seconds = open.duration_seconds,
            "closed interval"
        );
        Some(open.duration_seconds)
    }

    fn open_new<W>(&mut self, store: &W, ts: i64, kind: IntervalKind, label: String, detail: String)
    where
        W: IntervalWriter + ?Sized,
    {
        let mut open = OpenInterval {
            id: None,
            started_at: ts,
            kind,
            label,
            detail,
            duration_seconds: 0,
        };

        match store.append(&open.to_new_interval()) {
            Ok(id) => open.id = Some(id),
            Err(error) => {
                warn!(label = %open.label, error = %error, "failed to insert interval; retrying next tick");
            }
        }

        if open.kind.is_idle() {
            info!(detail = %open.detail, "user idle detected");
        } else {
            info!(label = %open.label, "new window");
        }
        self.open = Some(open);
    }

    fn replay_pending<W>(&mut self, store: &W)
    where
        W: IntervalWriter + ?Sized,
    {
        mem::take(&mut self.pending)
            .into_iter()
            .for_each(|write| self.apply(store, write));
    }

    fn apply<W>(&mut self, store: &W, write: PendingWrite)
    where
        W: IntervalWriter + ?Sized,
    {
        let result = match &write {
            PendingWrite::Close {
                id,
                duration_seconds,
            } => store.update_duration(*id, *duration_seconds),
            PendingWrite::Insert(interval) => store.append(interval).map(|_| ()),
        };

        match result {
            Ok(()) => {}
            Err(StoreError::NotFound(id)) => {
                warn!(id, "closing write targets a missing interval; dropped");
            }
            Err(error) => {
                warn!(error = %error, "closing write failed; queued for next tick");
                self.pending.push(write);
            }
        }
    }
}

fn resolve_label(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNKNOWN_LABEL.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
pub mod memory {
    use crate::db::{IntervalRecord, IntervalWriter, NewInterval, StoreError};
    use std::cell::{Cell, RefCell};

    /// In-process store that can be told to fail its next writes.
    #[derive(Default)]
    pub struct MemoryStore {
        rows: RefCell<Vec<IntervalRecord>>,
        failures_left: Cell<usize>,
        duration_history: RefCell<Vec<(i64, i64)>>,
    }

    impl MemoryStore {
        pub fn fail_next(&self, writes: usize) {
            self.failures_left.set(writes);
        }

        pub fn rows(&self) -> Vec<IntervalRecord> {
            let mut rows = self.rows.borrow().clone();
            rows.sort_by_key(|row| (row.started_at, row.id));
            rows
        }

        pub fn durations_written(&self, id: i64) -> Vec<i64> {
            self.duration_history
                .borrow()
                .iter()
                .filter(|(row_id, _)| *row_id == id)
                .map(|(_, duration)| *duration)
                .collect()
        }

        pub fn remove(&self, id: i64) {
            self.rows.borrow_mut().retain(|row| row.id != id);
        }

        fn injected_failure(&self) -> Result<(), StoreError> {
            let left = self.failures_left.get();
            if left == 0 {
                return Ok(());
            }
            self.failures_left.set(left - 1);
            Err(StoreError::LockPoisoned)
        }
    }

    impl IntervalWriter for MemoryStore {
        fn append(&self, interval: &NewInterval) -> Result<i64, StoreError> {
            self.injected_failure()?;
            let mut rows = self.rows.borrow_mut();
            let id = rows.iter().map(|row| row.id).max().unwrap_or(0) + 1;
            rows.push(IntervalRecord {
                id,
                started_at: interval.started_at,
                kind: interval.kind.clone(),
                label: interval.label.clone(),
                detail: interval.detail.clone(),
                duration_seconds: interval.duration_seconds,
            });
            self.duration_history
                .borrow_mut()
                .push((id, interval.duration_seconds));
            Ok(id)
        }

        fn update_duration(&self, id: i64, duration_seconds: i64) -> Result<(), StoreError> {
            self.injected_failure()?;
            let mut rows = self.rows.borrow_mut();
            let row = rows
                .iter_mut()
                .find(|row| row.id == id)
                .ok_or(StoreError::NotFound(id))?;
            row.duration_seconds = duration_seconds;
            self.duration_history
                .borrow_mut()
                .push((id, duration_seconds));
            Ok(())
        }
    }
}
