//! Transformer Executor - runs selected transformers against one component.
//!
//! Per transformer, in FQN order:
//! 1. validate input (optional)
//! 2. evaluate the transform template
//! 3. validate every produced resource (optional)
//! 4. record an [`ExecutionResult`]
//!
//! ## Concurrency
//!
//! With `parallel` set, every transformer is a task in a [`JoinSet`] and a
//! [`Semaphore`] bounds how many run at once. Engine calls block, so they
//! run on `spawn_blocking`. Results land in FQN-indexed slots and are
//! concatenated in FQN order, so output order never depends on scheduling.
//! Without `parallel`, transformers run one after another in FQN order.
//!
//! Engines that declare [`EngineConcurrency::Serialized`] get every call
//! behind one mutex gate; assembly and bookkeeping still run concurrently.
//!
//! ## Failure
//!
//! `fail_fast` cancels outstanding work on the first error and returns only
//! that error. Otherwise every transformer runs to completion and failures
//! are returned alongside the successful results.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, instrument, warn};

use crate::{
    application::{
        ApplicationError,
        error::ValidationPhase,
        ports::{EngineConcurrency, EngineError, EvaluationEngine},
    },
    domain::{Component, ExecutionContext, ExecutionResult, SharedValue, Transformer},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub parallel: bool,
    pub fail_fast: bool,
    pub validate_input: bool,
    pub validate_output: bool,
    /// Upper bound on concurrently running transformers.
    pub max_workers: Option<NonZeroUsize>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            fail_fast: true,
            validate_input: true,
            validate_output: true,
            max_workers: None,
        }
    }
}

/// Results and failures of one `execute_all` call.
#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    /// Successful results in transformer FQN order.
    pub results: Vec<ExecutionResult>,
    /// Failures in transformer FQN order.
    pub failures: Vec<ApplicationError>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// All resources, in transformer FQN order.
    pub fn resources(&self) -> impl Iterator<Item = &SharedValue> {
        self.results.iter().flat_map(|r| r.resources.iter())
    }

    /// Collapse failures into one error: the failure itself when there is
    /// exactly one, an aggregate otherwise.
    pub fn into_result(self, component_id: &str) -> Result<Vec<ExecutionResult>, ApplicationError> {
        if self.failures.is_empty() {
            return Ok(self.results);
        }
        let mut failures = self.failures;
        if failures.len() == 1 {
            return Err(failures.remove(0));
        }
        Err(ApplicationError::ExecutionFailed {
            component: component_id.to_owned(),
            failures,
        })
    }
}

/// Runs transformers through an [`EvaluationEngine`].
pub struct Executor {
    engine: Arc<dyn EvaluationEngine>,
    options: ExecutionOptions,
    /// Present when the engine must not be called concurrently.
    gate: Option<Arc<Mutex<()>>>,
}

impl Executor {
    pub fn new(engine: Arc<dyn EvaluationEngine>, options: ExecutionOptions) -> Self {
        let gate = match engine.concurrency() {
            EngineConcurrency::Shared => None,
            EngineConcurrency::Serialized => Some(Arc::new(Mutex::new(()))),
        };
        Self {
            engine,
            options,
            gate,
        }
    }

    pub fn options(&self) -> ExecutionOptions {
        self.options
    }

    /// Run every selected transformer against `component`.
    ///
    /// Duplicate transformers are run once. Under `fail_fast` the first
    /// error is returned and no results are surfaced.
    #[instrument(
        skip_all,
        fields(
            component = %component.id,
            provider = %provider_name,
            transformers = selected.len()
        )
    )]
    pub async fn execute_all(
        &self,
        component: Arc<Component>,
        selected: &[Arc<Transformer>],
        context: &ExecutionContext,
        provider_name: &str,
    ) -> Result<ExecutionOutcome, ApplicationError> {
        let mut ordered = selected.to_vec();
        ordered.sort_by(|a, b| a.fqn().cmp(b.fqn()));
        ordered.dedup_by(|a, b| a.fqn() == b.fqn());

        if ordered.is_empty() {
            return Ok(ExecutionOutcome::default());
        }

        let context = Arc::new(context.clone());
        let cancel = CancellationToken::new();
        let jobs: Vec<Job> = ordered
            .into_iter()
            .map(|transformer| Job {
                engine: Arc::clone(&self.engine),
                gate: self.gate.clone(),
                component: Arc::clone(&component),
                transformer,
                context: Arc::clone(&context),
                options: self.options,
                cancel: cancel.clone(),
            })
            .collect();

        let outcome = if self.options.parallel {
            self.run_parallel(jobs, &cancel, &component.id).await
        } else {
            self.run_sequential(jobs, &cancel).await
        }?;

        info!(
            results = outcome.results.len(),
            failures = outcome.failures.len(),
            resources = outcome.resources().count(),
            "Transformers executed"
        );
        Ok(outcome)
    }

    async fn run_sequential(
        &self,
        jobs: Vec<Job>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome, ApplicationError> {
        let mut outcome = ExecutionOutcome::default();
        for job in jobs {
            match job.spawn().await {
                Ok(result) => outcome.results.push(result),
                Err(err) if self.options.fail_fast => {
                    cancel.cancel();
                    warn!(error = %err, "Transformer failed; aborting component");
                    return Err(err);
                }
                Err(err) => {
                    warn!(error = %err, "Transformer failed; continuing");
                    outcome.failures.push(err);
                }
            }
        }
        Ok(outcome)
    }

    async fn run_parallel(
        &self,
        jobs: Vec<Job>,
        cancel: &CancellationToken,
        component_id: &str,
    ) -> Result<ExecutionOutcome, ApplicationError> {
        let slots = jobs.len();
        let workers = self
            .options
            .max_workers
            .map_or(slots, |cap| cap.get().min(slots));
        let semaphore = Arc::new(Semaphore::new(workers));
        debug!(workers, "Starting transformer pool");

        let mut tasks = JoinSet::new();
        for (slot, job) in jobs.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let permit = tokio::select! {
                    biased;
                    _ = job.cancel.cancelled() => return (slot, Err(job.cancelled())),
                    permit = semaphore.acquire_owned() => permit,
                };
                let Ok(_permit) = permit else {
                    return (slot, Err(job.cancelled()));
                };
                (slot, job.spawn().await)
            });
        }

        let mut results: Vec<Option<ExecutionResult>> = (0..slots).map(|_| None).collect();
        let mut failures: Vec<(usize, ApplicationError)> = Vec::new();
        // Lowest-slot failure seen after a fail-fast trigger.
        let mut first_error: Option<(usize, ApplicationError)> = None;

        while let Some(joined) = tasks.join_next().await {
            let (slot, result) = joined.unwrap_or_else(|join_error| {
                (
                    slots,
                    Err(ApplicationError::TaskFailed {
                        component: component_id.to_owned(),
                        reason: join_error.to_string(),
                    }),
                )
            });

            match result {
                Ok(result) => results[slot] = Some(result),
                Err(ApplicationError::Cancelled { .. }) if cancel.is_cancelled() => {}
                Err(err) if self.options.fail_fast => {
                    if !cancel.is_cancelled() {
                        cancel.cancel();
                        warn!(error = %err, "Transformer failed; cancelling remaining work");
                    }
                    // Queued tasks stop at their next checkpoint; a lower FQN
                    // already inside the engine may still fail and win.
                    if first_error.as_ref().is_none_or(|(first, _)| slot < *first) {
                        first_error = Some((slot, err));
                    }
                }
                Err(err) => {
                    warn!(error = %err, "Transformer failed; continuing");
                    failures.push((slot, err));
                }
            }
        }

        if let Some((_, err)) = first_error {
            return Err(err);
        }

        failures.sort_by_key(|(slot, _)| *slot);
        Ok(ExecutionOutcome {
            results: results.into_iter().flatten().collect(),
            failures: failures.into_iter().map(|(_, err)| err).collect(),
        })
    }
}

/// Everything one transformer run needs, owned so it can cross threads.
struct Job {
    engine: Arc<dyn EvaluationEngine>,
    gate: Option<Arc<Mutex<()>>>,
    component: Arc<Component>,
    transformer: Arc<Transformer>,
    context: Arc<ExecutionContext>,
    options: ExecutionOptions,
    cancel: CancellationToken,
}

impl Job {
    /// Run on the blocking pool, inside a span naming the transformer.
    async fn spawn(self) -> Result<ExecutionResult, ApplicationError> {
        let component = self.component.id.clone();
        let span = debug_span!("transformer", fqn = %self.transformer.fqn());
        let blocking_span = span.clone();

        tokio::task::spawn_blocking(move || blocking_span.in_scope(|| self.run()))
            .instrument(span)
            .await
            .unwrap_or_else(|join_error| {
                Err(ApplicationError::TaskFailed {
                    component,
                    reason: join_error.to_string(),
                })
            })
    }

    fn run(&self) -> Result<ExecutionResult, ApplicationError> {
        debug!("Executing transformer");

        if self.options.validate_input {
            self.checkpoint()?;
            self.gated(|engine| engine.validate_input(&self.transformer, &self.component))
                .map_err(|e| self.validation_error(ValidationPhase::Input, e))?;
        }

        self.checkpoint()?;
        let resources = self
            .gated(|engine| engine.evaluate(&self.transformer, &self.component, &self.context))
            .map_err(|e| ApplicationError::Execution {
                component: self.component.id.clone(),
                transformer: self.transformer.fqn().clone(),
                reason: e.to_string(),
            })?;

        if self.options.validate_output {
            for resource in &resources {
                self.checkpoint()?;
                self.gated(|engine| engine.validate_output(&self.transformer, resource))
                    .map_err(|e| self.validation_error(ValidationPhase::Output, e))?;
            }
        }

        debug!(resources = resources.len(), "Transformer produced resources");
        Ok(ExecutionResult::new(
            self.component.id.clone(),
            self.transformer.fqn().clone(),
            resources,
        ))
    }

    /// Call the engine, behind the gate when the engine requires it.
    fn gated<T>(
        &self,
        call: impl FnOnce(&dyn EvaluationEngine) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        match &self.gate {
            // The gate guards no data, so a poisoned lock is still usable.
            Some(gate) => {
                let _guard = gate.lock().unwrap_or_else(PoisonError::into_inner);
                call(self.engine.as_ref())
            }
            None => call(self.engine.as_ref()),
        }
    }

    fn checkpoint(&self) -> Result<(), ApplicationError> {
        if self.cancel.is_cancelled() {
            debug!("Transformer cancelled");
            return Err(self.cancelled());
        }
        Ok(())
    }

    fn cancelled(&self) -> ApplicationError {
        ApplicationError::Cancelled {
            component: self.component.id.clone(),
            transformer: self.transformer.fqn().clone(),
        }
    }

    fn validation_error(&self, phase: ValidationPhase, error: EngineError) -> ApplicationError {
        ApplicationError::Validation {
            component: self.component.id.clone(),
            transformer: self.transformer.fqn().clone(),
            phase,
            reason: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockEvaluationEngine;
    use crate::domain::{TransformerMetadata, structured_value::testing::value};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn transformer(fqn: &str) -> Arc<Transformer> {
        Arc::new(Transformer::new(TransformerMetadata {
            fqn: fqn.into(),
            name: fqn.into(),
            ..Default::default()
        }))
    }

    fn component() -> Arc<Component> {
        Arc::new(Component::new("web", value(json!({"image": "nginx"}))))
    }

    fn context() -> ExecutionContext {
        ExecutionContext::builder()
            .module_name("shop")
            .namespace("default")
            .build()
    }

    fn resource(name: &str) -> SharedValue {
        value(json!({"kind": "Deployment", "metadata": {"name": name}}))
    }

    fn names(outcome: &ExecutionOutcome) -> Vec<String> {
        outcome
            .resources()
            .map(|r| r.lookup("metadata.name").unwrap().as_string().unwrap())
            .collect()
    }

    fn engine(concurrency: EngineConcurrency) -> MockEvaluationEngine {
        let mut engine = MockEvaluationEngine::new();
        engine.expect_concurrency().return_const(concurrency);
        engine.expect_validate_input().returning(|_, _| Ok(()));
        engine.expect_validate_output().returning(|_, _| Ok(()));
        engine
    }

    /// `t.b` fails; everything else yields one resource.
    fn failing_engine() -> MockEvaluationEngine {
        let mut engine = engine(EngineConcurrency::Shared);
        engine
            .expect_evaluate()
            .returning(|transformer, _, _| match transformer.fqn().as_str() {
                "t.b" => Err(EngineError::Evaluation("template exploded".into())),
                other => Ok(vec![resource(other)]),
            });
        engine
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_results_are_assembled_in_fqn_order() {
        let mut engine = engine(EngineConcurrency::Shared);
        // Earlier FQNs sleep longer, so completion order is reversed.
        engine.expect_evaluate().returning(|transformer, _, _| {
            let delay = match transformer.fqn().as_str() {
                "t.a" => 40,
                "t.b" => 20,
                _ => 0,
            };
            std::thread::sleep(Duration::from_millis(delay));
            let name = transformer.fqn().as_str().trim_start_matches("t.");
            Ok(vec![resource(&format!("{name}-1")), resource(&format!("{name}-2"))])
        });
        let executor = Executor::new(Arc::new(engine), ExecutionOptions::default());
        let selected = vec![transformer("t.c"), transformer("t.a"), transformer("t.b")];

        let first = executor
            .execute_all(component(), &selected, &context(), "test")
            .await
            .unwrap();
        let second = executor
            .execute_all(component(), &selected, &context(), "test")
            .await
            .unwrap();

        assert_eq!(names(&first), vec!["a-1", "a-2", "b-1", "b-2", "c-1", "c-2"]);
        assert_eq!(names(&first), names(&second));
        let fqns: Vec<_> = first
            .results
            .iter()
            .map(|r| r.transformer_fqn().as_str())
            .collect();
        assert_eq!(fqns, vec!["t.a", "t.b", "t.c"]);
        assert_eq!(first.results[0].metadata.resource_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn serialized_engine_never_runs_concurrently() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut engine = MockEvaluationEngine::new();
        engine
            .expect_concurrency()
            .return_const(EngineConcurrency::Serialized);
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        engine.expect_evaluate().returning(move |transformer, _, _| {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            a.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![resource(transformer.fqn().as_str())])
        });

        let executor = Executor::new(
            Arc::new(engine),
            ExecutionOptions {
                validate_input: false,
                validate_output: false,
                ..Default::default()
            },
        );
        let selected: Vec<_> = ["t.a", "t.b", "t.c", "t.d"].map(transformer).to_vec();

        let outcome = executor
            .execute_all(component(), &selected, &context(), "test")
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 4);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn worker_cap_bounds_concurrency() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut engine = engine(EngineConcurrency::Shared);
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        engine.expect_evaluate().returning(move |_, _, _| {
            let now = a.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10));
            a.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        });

        let executor = Executor::new(
            Arc::new(engine),
            ExecutionOptions {
                max_workers: NonZeroUsize::new(2),
                ..Default::default()
            },
        );
        let selected: Vec<_> = ["t.a", "t.b", "t.c", "t.d", "t.e"].map(transformer).to_vec();

        let outcome = executor
            .execute_all(component(), &selected, &context(), "test")
            .await
            .unwrap();
        assert_eq!(outcome.results.len(), 5);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fail_fast_returns_only_the_error() {
        for parallel in [true, false] {
            let executor = Executor::new(
                Arc::new(failing_engine()),
                ExecutionOptions {
                    parallel,
                    ..Default::default()
                },
            );
            let err = executor
                .execute_all(
                    component(),
                    &[transformer("t.a"), transformer("t.b")],
                    &context(),
                    "test",
                )
                .await
                .unwrap_err();

            match err {
                ApplicationError::Execution {
                    transformer,
                    component,
                    reason,
                } => {
                    assert_eq!(transformer.as_str(), "t.b");
                    assert_eq!(component, "web");
                    assert!(reason.contains("template exploded"));
                }
                other => panic!("expected execution error, got {other:?}"),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fail_fast_reports_the_lowest_failing_fqn_in_both_modes() {
        for parallel in [true, false] {
            let mut engine = engine(EngineConcurrency::Shared);
            // t.a fails last in wall-clock time but first in FQN order.
            engine.expect_evaluate().returning(|transformer, _, _| {
                let delay = match transformer.fqn().as_str() {
                    "t.a" => 80,
                    _ => 20,
                };
                std::thread::sleep(Duration::from_millis(delay));
                Err(EngineError::Evaluation(format!("{} failed", transformer.fqn())))
            });
            let executor = Executor::new(
                Arc::new(engine),
                ExecutionOptions {
                    parallel,
                    validate_input: false,
                    validate_output: false,
                    ..Default::default()
                },
            );

            let err = executor
                .execute_all(
                    component(),
                    &[transformer("t.b"), transformer("t.a")],
                    &context(),
                    "test",
                )
                .await
                .unwrap_err();

            match err {
                ApplicationError::Execution { transformer, .. } => {
                    assert_eq!(transformer.as_str(), "t.a", "parallel = {parallel}");
                }
                other => panic!("expected execution error, got {other:?}"),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn sequential_fail_fast_starts_nothing_after_the_error() {
        let mut engine = engine(EngineConcurrency::Shared);
        engine
            .expect_evaluate()
            .withf(|transformer, _, _| transformer.fqn().as_str() == "t.a")
            .times(1)
            .returning(|_, _, _| Err(EngineError::Evaluation("boom".into())));
        engine
            .expect_evaluate()
            .withf(|transformer, _, _| transformer.fqn().as_str() != "t.a")
            .never();

        let executor = Executor::new(
            Arc::new(engine),
            ExecutionOptions {
                parallel: false,
                ..Default::default()
            },
        );
        let selected: Vec<_> = ["t.c", "t.b", "t.a"].map(transformer).to_vec();

        let err = executor
            .execute_all(component(), &selected, &context(), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, ApplicationError::Execution { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn keep_going_returns_results_and_attributed_failures() {
        let executor = Executor::new(
            Arc::new(failing_engine()),
            ExecutionOptions {
                fail_fast: false,
                ..Default::default()
            },
        );
        let selected: Vec<_> = ["t.c", "t.b", "t.a"].map(transformer).to_vec();

        let outcome = executor
            .execute_all(component(), &selected, &context(), "test")
            .await
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(names(&outcome), vec!["t.a", "t.c"]);
        assert!(matches!(
            &outcome.failures[..],
            [ApplicationError::Execution { transformer, .. }] if transformer.as_str() == "t.b"
        ));

        let err = outcome.into_result("web").unwrap_err();
        assert!(matches!(err, ApplicationError::Execution { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn validation_failures_carry_their_phase() {
        let mut engine = MockEvaluationEngine::new();
        engine
            .expect_concurrency()
            .return_const(EngineConcurrency::Shared);
        engine
            .expect_validate_input()
            .returning(|transformer, _| match transformer.fqn().as_str() {
                "t.in" => Err(EngineError::Validation("missing image".into())),
                _ => Ok(()),
            });
        engine
            .expect_evaluate()
            .returning(|_, _, _| Ok(vec![resource("r")]));
        engine
            .expect_validate_output()
            .returning(|transformer, _| match transformer.fqn().as_str() {
                "t.out" => Err(EngineError::Validation("missing apiVersion".into())),
                _ => Ok(()),
            });

        let executor = Executor::new(
            Arc::new(engine),
            ExecutionOptions {
                fail_fast: false,
                ..Default::default()
            },
        );
        let outcome = executor
            .execute_all(
                component(),
                &[transformer("t.out"), transformer("t.in"), transformer("t.ok")],
                &context(),
                "test",
            )
            .await
            .unwrap();

        let phases: Vec<_> = outcome
            .failures
            .iter()
            .map(|failure| match failure {
                ApplicationError::Validation { phase, transformer, .. } => {
                    (transformer.as_str().to_owned(), *phase)
                }
                other => panic!("unexpected failure {other:?}"),
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                ("t.in".to_owned(), ValidationPhase::Input),
                ("t.out".to_owned(), ValidationPhase::Output),
            ]
        );
        assert_eq!(outcome.results.len(), 1);

        let err = outcome.into_result("web").unwrap_err();
        assert!(matches!(err, ApplicationError::ExecutionFailed { ref failures, .. } if failures.len() == 2));
    }

    #[tokio::test]
    async fn empty_selection_is_a_no_op() {
        let executor = Executor::new(Arc::new(engine(EngineConcurrency::Shared)), ExecutionOptions::default());
        let outcome = executor
            .execute_all(component(), &[], &context(), "test")
            .await
            .unwrap();
        assert!(outcome.results.is_empty());
        assert!(outcome.is_success());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn duplicate_selections_run_once() {
        let mut engine = engine(EngineConcurrency::Shared);
        engine
            .expect_evaluate()
            .times(1)
            .returning(|_, _, _| Ok(vec![resource("only")]));
        let executor = Executor::new(Arc::new(engine), ExecutionOptions::default());

        let outcome = executor
            .execute_all(
                component(),
                &[transformer("t.a"), transformer("t.a")],
                &context(),
                "test",
            )
            .await
            .unwrap();
        assert_eq!(names(&outcome), vec!["only"]);
    }
}
