//! Durable workflow engine: step memoization, bounded retry, idempotent
//! resumption.
//!
//! A pipeline is a plain async function over a [`StepContext`]. Each unit of
//! side-effecting work goes through [`StepContext::step`], which records the
//! result durably before returning it. When a run is retried (or resumed
//! after a crash), steps that already succeeded replay their recorded value
//! instead of re-executing, so side effects occur at most once per step per
//! run.
//!
//! The whole run is retried from the top up to [`DEFAULT_MAX_ATTEMPTS`]
//! times. A [`StepError::NotFound`] short-circuits: it is recorded and the
//! run fails immediately, regardless of remaining budget.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{warn, Instrument};

use triage_state::{RunId, RunState, RunStore, StepEntry, StepStatus};

use crate::domain::{RunOutcome, StepError, StepResult, TriggerEvent};
use crate::obs;

/// Attempt budget per run: the initial attempt plus two retries.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// A named pipeline the engine can dispatch trigger events to.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Stable pipeline identifier; runs are keyed by it.
    fn id(&self) -> &'static str;

    /// Execute one attempt. Returns the success message for the run
    /// outcome, or the step failure that aborted the attempt.
    async fn execute(&self, ctx: &StepContext, event: &TriggerEvent) -> StepResult<String>;
}

/// Per-attempt execution context handed to a pipeline.
///
/// Holds the memo of previously succeeded steps (loaded from the run store
/// at the start of the attempt) and records new step outcomes durably.
pub struct StepContext {
    run_id: RunId,
    runs: Arc<dyn RunStore>,
    memo: Mutex<HashMap<String, serde_json::Value>>,
}

impl StepContext {
    fn new(run_id: RunId, runs: Arc<dyn RunStore>, memo: HashMap<String, serde_json::Value>) -> Self {
        Self {
            run_id,
            runs,
            memo: Mutex::new(memo),
        }
    }

    /// The run this context belongs to.
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Execute a memoized step.
    ///
    /// If a successful entry exists under `name`, its recorded value is
    /// replayed and `f` is never invoked. Otherwise `f` runs; a success is
    /// persisted before it is returned, a failure is persisted and
    /// propagated, aborting the rest of the attempt.
    pub async fn step<T, F, Fut>(&self, name: &str, f: F) -> StepResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = StepResult<T>> + Send,
    {
        let replay = { self.memo.lock().unwrap().get(name).cloned() };
        if let Some(value) = replay {
            obs::emit_step_replayed(&self.run_id.0, name);
            return serde_json::from_value(value).map_err(|e| {
                StepError::transient(format!("step {name}: stored result unreadable: {e}"))
            });
        }

        match f().await {
            Ok(value) => {
                let json = serde_json::to_value(&value).map_err(|e| {
                    StepError::transient(format!("step {name}: result not serializable: {e}"))
                })?;
                // Durably record before handing the value back.
                self.runs
                    .record_step(&self.run_id, StepEntry::succeeded(name, json.clone()))
                    .await?;
                self.memo.lock().unwrap().insert(name.to_string(), json);
                obs::emit_step_completed(&self.run_id.0, name);
                Ok(value)
            }
            Err(err) => {
                obs::emit_step_failed(&self.run_id.0, name, &err, err.is_retriable());
                // Record the failure; the step error still wins if the
                // record itself cannot be written.
                if let Err(store_err) = self
                    .runs
                    .record_step(&self.run_id, StepEntry::failed(name, err.to_string()))
                    .await
                {
                    warn!(run_id = %self.run_id, step = name, error = %store_err,
                          "failed to record step failure");
                }
                Err(err)
            }
        }
    }
}

/// Executes named pipelines exactly once per triggering event.
pub struct WorkflowEngine {
    runs: Arc<dyn RunStore>,
    max_attempts: u32,
}

impl WorkflowEngine {
    /// Engine over the given run store with the default attempt budget.
    pub fn new(runs: Arc<dyn RunStore>) -> Self {
        Self {
            runs,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the attempt budget (testing and tuning).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Dispatch a trigger event to a pipeline and drive it to a terminal
    /// state.
    ///
    /// Looks up or creates the run keyed by `(pipeline.id(), event
    /// dedupe key)`. A run that already finished returns its recorded
    /// outcome without executing anything. Never re-raises: every call
    /// resolves to a [`RunOutcome`].
    pub async fn dispatch(&self, pipeline: &dyn Pipeline, event: &TriggerEvent) -> RunOutcome {
        let key = event.dedupe_key();
        let run = match self
            .runs
            .find_or_create(pipeline.id(), &key, &event.data)
            .await
        {
            Ok(run) => run,
            Err(e) => {
                warn!(pipeline_id = pipeline.id(), error = %e, "could not persist run");
                return RunOutcome::failure(format!("could not persist run: {e}"));
            }
        };

        // An RAII `obs::RunSpan` guard would make this future !Send when
        // held across awaits; instrument the rest of the run with the same
        // span instead.
        let span = tracing::info_span!("triage.run", run_id = %run.run_id.0);
        async {
        if run.is_terminal() {
            // Duplicate trigger for a finished run: replay its outcome.
            return RunOutcome {
                success: run.state == RunState::Succeeded,
                message: run.message.unwrap_or_default(),
            };
        }

        let run_id = run.run_id.clone();
        let mut attempts = run.attempts;

        loop {
            if attempts >= self.max_attempts {
                return self
                    .finish(&run_id, attempts, RunOutcome::failure("retry budget exhausted"))
                    .await;
            }

            attempts = match self.runs.bump_attempt(&run_id).await {
                Ok(n) => n,
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "could not start attempt");
                    return RunOutcome::failure(format!("could not start attempt: {e}"));
                }
            };
            obs::emit_run_started(&run_id.0, pipeline.id(), attempts);

            let memo = match self.load_memo(&run_id).await {
                Ok(memo) => memo,
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "could not load step log");
                    continue;
                }
            };

            let ctx = StepContext::new(run_id.clone(), Arc::clone(&self.runs), memo);
            match pipeline.execute(&ctx, event).await {
                Ok(message) => {
                    return self
                        .finish(&run_id, attempts, RunOutcome::success(message))
                        .await;
                }
                Err(err) if err.is_retriable() && attempts < self.max_attempts => {
                    warn!(run_id = %run_id, attempt = attempts, error = %err, "attempt failed, retrying");
                }
                Err(err) => {
                    return self
                        .finish(&run_id, attempts, RunOutcome::failure(err.to_string()))
                        .await;
                }
            }
        }
        }
        .instrument(span)
        .await
    }

    async fn load_memo(
        &self,
        run_id: &RunId,
    ) -> Result<HashMap<String, serde_json::Value>, triage_state::StorageError> {
        let steps = self.runs.steps(run_id).await?;
        Ok(steps
            .into_iter()
            .filter(|s| s.status == StepStatus::Succeeded)
            .filter_map(|s| s.value.map(|v| (s.step, v)))
            .collect())
    }

    async fn finish(&self, run_id: &RunId, attempts: u32, outcome: RunOutcome) -> RunOutcome {
        let result = if outcome.success {
            self.runs.complete(run_id, &outcome.message).await
        } else {
            self.runs.fail(run_id, &outcome.message).await
        };
        if let Err(e) = result {
            warn!(run_id = %run_id, error = %e, "failed to finalize run");
        }
        obs::emit_run_finished(&run_id.0, attempts, outcome.success, &outcome.message);
        outcome
    }
}
