use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use dashmap::DashMap;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::actions::{ActionContext, ActionHandler, Capability, Params, standard_actions};
use crate::browser::Browser;
use crate::dsl::{EngineSettings, NullPolicy, ParamValue, StepConfig, WorkflowConfig};
use crate::error::WorkflowError;
use crate::runtime::context::ExecutionContext;
use crate::runtime::store::ConfigStore;
use crate::runtime::transition::resolve_next;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// Next-state resolution produced no state.
    Completed,
    /// The null policy stopped the run after `state` returned null.
    Halted { state: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub steps: usize,
    pub history: BTreeMap<String, Value>,
    pub outcome: Outcome,
    pub last_result: Value,
}

/// Sequential step executor over a workflow graph.
///
/// The engine holds the capability registry, the page driver and any named
/// data sources. All per-run state lives in [`ExecutionContext`].
pub struct Engine {
    actions: HashMap<Capability, Arc<dyn ActionHandler>>,
    browser: Arc<dyn Browser>,
    sources: DashMap<String, Value>,
}

impl Engine {
    pub fn new(browser: Arc<dyn Browser>) -> Self {
        Self {
            actions: HashMap::new(),
            browser,
            sources: DashMap::new(),
        }
    }

    /// An engine with every capability registered.
    pub fn with_standard_actions(browser: Arc<dyn Browser>, client: Client) -> Self {
        let mut engine = Self::new(browser);
        for handler in standard_actions(client) {
            engine.register_action(handler);
        }
        engine
    }

    /// Binds `handler` to its capability, replacing any previous binding.
    pub fn register_action(&mut self, handler: Arc<dyn ActionHandler>) {
        self.actions.insert(handler.capability(), handler);
    }

    /// Makes `value` available to `fetch_source` under `name`.
    pub fn register_source(&self, name: &str, value: Value) {
        self.sources.insert(name.to_string(), value);
    }

    pub async fn run(&self, store: &ConfigStore) -> Result<RunReport, WorkflowError> {
        let settings = store.settings().await;
        self.run_with_settings(store, settings).await
    }

    /// Runs the stored graph under `settings` instead of the document's own.
    /// Write-backs still persist the stored document, which never sees
    /// `settings`.
    pub async fn run_with_settings(
        &self,
        store: &ConfigStore,
        settings: EngineSettings,
    ) -> Result<RunReport, WorkflowError> {
        let initial_state = store.initial_state().await;
        self.execute(store, &initial_state, settings).await
    }

    /// Runs an alternative graph without touching any persisted document.
    pub async fn run_with(&self, config: WorkflowConfig) -> Result<RunReport, WorkflowError> {
        let store = ConfigStore::in_memory(config);
        self.run(&store).await
    }

    pub async fn run_from(&self, store: &ConfigStore, initial_state: &str) -> Result<RunReport, WorkflowError> {
        let settings = store.settings().await;
        self.execute(store, initial_state, settings).await
    }

    async fn execute(
        &self,
        store: &ConfigStore,
        initial_state: &str,
        settings: EngineSettings,
    ) -> Result<RunReport, WorkflowError> {
        let mut ctx = ExecutionContext::new(initial_state);
        let span = info_span!("run", run_id = %ctx.run_id);

        async move {
            info!(initial_state, "Workflow started");
            while let Some(state) = ctx.current_state.clone() {
                if let Some(limit) = settings.max_steps {
                    if ctx.steps >= limit {
                        error!(limit, state = %state, "Step limit exceeded, aborting");
                        return Err(WorkflowError::StepLimitExceeded { limit, state });
                    }
                }
                ctx = match self.step(store, &settings, ctx).await {
                    Ok(next) => next,
                    Err(e) => {
                        error!(error = %e, "Workflow aborted");
                        return Err(e);
                    }
                };
            }

            let outcome = match ctx.halted_at.take() {
                Some(state) => Outcome::Halted { state },
                None => Outcome::Completed,
            };
            info!(steps = ctx.steps, ?outcome, "Workflow finished");
            Ok(RunReport {
                run_id: ctx.run_id,
                steps: ctx.steps,
                history: ctx.history,
                outcome,
                last_result: ctx.previous_result,
            })
        }
        .instrument(span)
        .await
    }

    /// Executes `ctx.current_state` and returns the context positioned on the
    /// following state. A finished context is returned unchanged.
    pub async fn step(
        &self,
        store: &ConfigStore,
        settings: &EngineSettings,
        ctx: ExecutionContext,
    ) -> Result<ExecutionContext, WorkflowError> {
        let Some(state) = ctx.current_state.clone() else {
            return Ok(ctx);
        };
        let step = store
            .step(&state)
            .await
            .ok_or_else(|| WorkflowError::UnknownState(state.clone()))?;
        let span = info_span!("step", state = %state, method = %step.method);
        self.dispatch(store, settings, state, step, ctx).instrument(span).await
    }

    async fn dispatch(
        &self,
        store: &ConfigStore,
        settings: &EngineSettings,
        state: String,
        step: StepConfig,
        mut ctx: ExecutionContext,
    ) -> Result<ExecutionContext, WorkflowError> {
        let params: Params = step
            .parameters
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    ParamValue::Literal(v) => v.clone(),
                    ParamValue::PreviousResult => ctx.previous_result.clone(),
                };
                (name.clone(), value)
            })
            .collect();

        let capability = Capability::from_name(&step.method).ok_or_else(|| WorkflowError::UnknownAction {
            state: state.clone(),
            action: step.method.clone(),
        })?;
        let handler = self
            .actions
            .get(&capability)
            .ok_or_else(|| WorkflowError::ActionNotRegistered {
                state: state.clone(),
                action: step.method.clone(),
            })?;
        handler
            .validate(&params)
            .map_err(|source| WorkflowError::Action { state: state.clone(), source })?;

        info!("Executing step");
        let action_ctx = ActionContext {
            state: &state,
            history: &ctx.history,
            settings,
            browser: self.browser.as_ref(),
            store,
            sources: &self.sources,
        };
        let result = handler
            .execute(params, &action_ctx)
            .await
            .map_err(|source| WorkflowError::Action { state: state.clone(), source })?;

        let is_null = result.is_null();
        ctx.record(&state, result);

        if is_null && settings.on_null == NullPolicy::Halt {
            warn!("Step returned null, halting");
            ctx.halted_at = Some(state);
            ctx.current_state = None;
            return Ok(ctx);
        }

        ctx.current_state = resolve_next(step.next_state.as_ref(), &ctx.previous_result);
        info!(next = ?ctx.current_state, "Step finished");
        Ok(ctx)
    }
}
