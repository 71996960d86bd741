//! Strategic plan generation: a single-flight create over the plan history.
//!
//! `generate()` takes `&self` so callers can hold the workflow behind an
//! `Arc` and fire from anywhere; a second call while one is in flight is
//! rejected with [`WorkflowError::AlreadyGenerating`] and sends nothing.
//! The in-flight flag is a drop guard, so an abandoned `generate()` future
//! frees the workflow immediately.

use std::sync::{Mutex, MutexGuard};

use tracing::{info, warn};

use crate::models::StrategicPlan;
use crate::store::{create_remote, fetch_page, Mirror, Page, Resource, StoreError};
use crate::transport::{Transport, TransportError};

const GENERATE_FALLBACK: &str =
    "Failed to generate strategic plan. Make sure you have recent journal entries.";

impl Resource for StrategicPlan {
    type Draft = ();
    const KIND: &'static str = "strategic_plan";

    fn id(&self) -> &str {
        &self.id
    }

    fn list_path() -> &'static str {
        "/strategic-plan/history"
    }

    fn create_path() -> &'static str {
        "/strategic-plan/generate"
    }

    fn matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(needle)
            || self.analysis.to_lowercase().contains(needle)
            || self
                .recommendations
                .iter()
                .any(|r| r.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Generating,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("a strategic plan is already being generated")]
    AlreadyGenerating,
    #[error("plan generation failed: {0}")]
    Generate(StoreError),
    #[error("failed to load plan history: {0}")]
    History(StoreError),
}

impl WorkflowError {
    pub fn display_message(&self) -> String {
        match self {
            WorkflowError::AlreadyGenerating => "A plan is already being generated".to_string(),
            WorkflowError::Generate(e) => match e.transport() {
                Some(TransportError::Status {
                    detail: Some(detail),
                    ..
                }) => detail.clone(),
                Some(TransportError::Status { .. }) => GENERATE_FALLBACK.to_string(),
                _ => e.display_message(),
            },
            WorkflowError::History(e) => e.display_message(),
        }
    }

    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            WorkflowError::AlreadyGenerating => None,
            WorkflowError::Generate(e) | WorkflowError::History(e) => e.transport(),
        }
    }
}

struct PlanState {
    phase: GenerationState,
    current: Option<StrategicPlan>,
    history: Mirror<StrategicPlan>,
}

pub struct PlanWorkflow {
    transport: Transport,
    state: Mutex<PlanState>,
}

/// Holds the `Generating` phase; dropping it returns the workflow to `Idle`.
struct InFlight<'a> {
    state: &'a Mutex<PlanState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).phase = GenerationState::Idle;
    }
}

impl PlanWorkflow {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            state: Mutex::new(PlanState {
                phase: GenerationState::Idle,
                current: None,
                history: Mirror::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PlanState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> GenerationState {
        self.lock().phase
    }

    pub fn is_generating(&self) -> bool {
        self.state() == GenerationState::Generating
    }

    pub fn current(&self) -> Option<StrategicPlan> {
        self.lock().current.clone()
    }

    pub fn history(&self) -> Vec<StrategicPlan> {
        self.lock().history.items().to_vec()
    }

    fn begin(&self) -> Result<InFlight<'_>, WorkflowError> {
        let mut state = self.lock();
        if state.phase == GenerationState::Generating {
            warn!("generate requested while a plan is already in flight");
            return Err(WorkflowError::AlreadyGenerating);
        }
        state.phase = GenerationState::Generating;
        Ok(InFlight { state: &self.state })
    }

    /// Ask the backend for a new plan. On success it becomes current and is
    /// prepended to history; on failure nothing but the phase changes.
    pub async fn generate(&self) -> Result<StrategicPlan, WorkflowError> {
        let _in_flight = self.begin()?;
        info!("generating strategic plan");

        match create_remote::<StrategicPlan>(&self.transport, &()).await {
            Ok(plan) => {
                let mut state = self.lock();
                state.current = Some(plan.clone());
                state.history.prepend(plan.clone());
                info!(plan_id = %plan.id, "strategic plan generated");
                Ok(plan)
            }
            Err(e) => {
                warn!(error = %e, "strategic plan generation failed");
                Err(WorkflowError::Generate(e))
            }
        }
    }

    /// Replace history with one page (newest first). Seeds the current
    /// selection with the newest plan when nothing is selected yet.
    pub async fn load_history(&self, page: Page) -> Result<Vec<StrategicPlan>, WorkflowError> {
        let plans = fetch_page::<StrategicPlan>(&self.transport, page)
            .await
            .map_err(WorkflowError::History)?;

        let mut state = self.lock();
        if state.current.is_none() {
            state.current = plans.first().cloned();
        }
        state.history.replace_all(plans.clone());
        Ok(plans)
    }

    /// Make a historical plan current. Local only; `None` if the id is unknown.
    pub fn select(&self, id: &str) -> Option<StrategicPlan> {
        let mut state = self.lock();
        let plan = state.history.find(id).cloned()?;
        state.current = Some(plan.clone());
        Some(plan)
    }
}
