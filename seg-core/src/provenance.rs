//! Provenance ids and the recorded trail of state-producing actions.
//!
//! Every action that changes project data gets a process-unique
//! [`ProvenanceId`] before it runs. Successful runs are recorded as a
//! [`ProvenanceStep`] so the history behind any result can be walked back.
//! The trail is stored as JSON lines, one step per line.

use std::collections::{BTreeSet, HashMap};
use std::io::{BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use seg_types::ProvenanceId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lock;

#[derive(Debug, Error)]
pub enum ProvenanceError {
    #[error("provenance i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("provenance line {line}: {source}")]
    Format {
        line: usize,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceStep {
    pub id: ProvenanceId,
    /// Persistent export of the action that produced the data.
    pub action: String,
    /// Provenance ids of the data the action consumed.
    #[serde(default)]
    pub inputs: Vec<ProvenanceId>,
    pub user: String,
    pub timestamp_ms: u64,
}

impl ProvenanceStep {
    pub fn new(id: ProvenanceId, action: String, inputs: Vec<ProvenanceId>, user: String) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            id,
            action,
            inputs,
            user,
            timestamp_ms,
        }
    }
}

/// Id generator plus the in-memory trail.
pub struct ProvenanceRecorder {
    counter: AtomicU64,
    enabled: bool,
    user: String,
    steps: Mutex<Vec<ProvenanceStep>>,
}

impl ProvenanceRecorder {
    pub fn new(enabled: bool, user: impl Into<String>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            enabled,
            user: user.into(),
            steps: Mutex::new(Vec::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Next id. Safe from any thread; ids are never reused.
    pub fn generate(&self) -> ProvenanceId {
        ProvenanceId::new(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Last id handed out (0 before the first).
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Move the counter, e.g. after loading a saved project. The next id
    /// generated is `value + 1`.
    pub fn set_current(&self, value: u64) {
        self.counter.store(value, Ordering::SeqCst);
    }

    pub fn record(&self, step: ProvenanceStep) {
        log::debug!(target: "provenance", "#{} {}", step.id, step.action);
        lock(&self.steps).push(step);
    }

    pub fn steps(&self) -> Vec<ProvenanceStep> {
        lock(&self.steps).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.steps).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.steps).clear();
    }

    /// The step that produced `id` and everything it transitively consumed,
    /// oldest first.
    pub fn trail_for(&self, id: ProvenanceId) -> Vec<ProvenanceStep> {
        let steps = lock(&self.steps);
        let by_id: HashMap<ProvenanceId, &ProvenanceStep> =
            steps.iter().map(|s| (s.id, s)).collect();

        let mut seen = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            if let Some(step) = by_id.get(&next) {
                stack.extend(step.inputs.iter().copied());
            }
        }
        seen.into_iter()
            .filter_map(|id| by_id.get(&id).map(|s| (*s).clone()))
            .collect()
    }

    pub fn write_jsonl<W: Write>(&self, mut out: W) -> Result<(), ProvenanceError> {
        for step in lock(&self.steps).iter() {
            let line = serde_json::to_string(step).map_err(|source| ProvenanceError::Format {
                line: 0,
                source,
            })?;
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        Ok(())
    }

    /// Replace the trail with the steps in `input` and move the counter past
    /// the highest loaded id so new ids never collide with saved ones.
    pub fn load_jsonl<R: BufRead>(&self, input: R) -> Result<usize, ProvenanceError> {
        let mut loaded = Vec::new();
        for (n, line) in input.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let step: ProvenanceStep = serde_json::from_str(&line)
                .map_err(|source| ProvenanceError::Format { line: n + 1, source })?;
            loaded.push(step);
        }
        let max = loaded.iter().map(|s| s.id.get()).max().unwrap_or(0);
        self.counter.fetch_max(max, Ordering::SeqCst);
        let count = loaded.len();
        *lock(&self.steps) = loaded;
        Ok(count)
    }
}
