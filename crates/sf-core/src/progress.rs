//! Progress/cancellation channel
//!
//! Every unit of work (one forward pass, one ensemble member) brackets a
//! `start`/`end` [`ProgressEvent`]. The callback runs synchronously on the
//! emitting thread (which may be a worker thread under parallel execution)
//! and returns a [`ProgressControl`]; `Abort` stops the whole operation at
//! the next checkpoint. Under parallel execution, events for concurrently
//! running segments interleave: consumers must not assume monotonic
//! `segment_offset` ordering across segments.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{SepError, SepResult};

/// Whether the event marks the start or the end of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressState {
    /// The unit of work is about to run
    Start,
    /// The unit of work finished
    End,
}

/// Callback verdict checked at every checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressControl {
    /// Keep going
    #[default]
    Continue,
    /// Stop the whole operation; the caller observes a cancellation outcome
    Abort,
}

/// Snapshot of separation progress; never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    /// Index of the submodel within the bag (0 for a single model)
    pub model_idx_in_bag: usize,

    /// Index of the randomized shift within the current segment
    pub shift_idx: usize,

    /// Start offset of the current segment, in samples
    pub segment_offset: usize,

    /// Start or end of the unit of work
    pub state: ProgressState,

    /// Total audio length, in samples
    pub audio_length: usize,

    /// Count of submodels in the model (1 for a single model)
    pub models: usize,
}

/// Progress callback. Receives the typed event plus the event merged over the
/// caller-supplied context map.
pub type ProgressCallback =
    Arc<dyn Fn(&ProgressEvent, &Map<String, Value>) -> ProgressControl + Send + Sync>;

/// Caller-supplied callback plus its private context.
#[derive(Clone)]
pub struct ProgressHandler {
    callback: ProgressCallback,
    context: Map<String, Value>,
}

impl ProgressHandler {
    /// Wrap a callback with an empty context
    pub fn new(
        callback: impl Fn(&ProgressEvent, &Map<String, Value>) -> ProgressControl
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            callback: Arc::new(callback),
            context: Map::new(),
        }
    }

    /// Attach a caller context map, passed through to every invocation
    pub fn with_context(mut self, context: Map<String, Value>) -> Self {
        self.context = context;
        self
    }

    /// Merge the event over the context (event fields win on key collision)
    /// and invoke the callback. `Abort` maps to [`SepError::Cancelled`].
    pub fn emit(&self, event: &ProgressEvent) -> SepResult<()> {
        let mut merged = self.context.clone();
        if let Ok(Value::Object(fields)) = serde_json::to_value(event) {
            for (key, value) in fields {
                merged.insert(key, value);
            }
        }
        match (self.callback)(event, &merged) {
            ProgressControl::Continue => Ok(()),
            ProgressControl::Abort => Err(SepError::Cancelled),
        }
    }
}

/// Checkpoint emitter carrying the per-model invariants of one apply call.
#[derive(Clone, Copy)]
pub(crate) struct Emitter<'a> {
    pub handler: Option<&'a ProgressHandler>,
    pub model_idx_in_bag: usize,
    pub models: usize,
    pub audio_length: usize,
}

impl Emitter<'_> {
    pub fn checkpoint(
        &self,
        segment_offset: usize,
        shift_idx: usize,
        state: ProgressState,
    ) -> SepResult<()> {
        let Some(handler) = self.handler else {
            return Ok(());
        };
        handler.emit(&ProgressEvent {
            model_idx_in_bag: self.model_idx_in_bag,
            shift_idx,
            segment_offset,
            state,
            audio_length: self.audio_length,
            models: self.models,
        })
    }
}
