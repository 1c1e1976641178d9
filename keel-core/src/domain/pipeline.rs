//! Pipeline domain types
//!
//! A pipeline is an ordered list of stages, each an ordered list of steps.
//! All three levels carry their own run lifecycle; the state machine never
//! moves a child because its parent moved (see [`CascadePolicy`]).
//!
//! [`CascadePolicy`]: crate::lifecycle::CascadePolicy

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::{
    self, EntityKind, Lifecycle, Operation, RUN_TABLE, RunStatus, Stateful, TransitionTable,
};

/// Pipeline executing the steps of a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub deployment_id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub stages: Vec<PipelineStage>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle<RunStatus>,
}

impl Pipeline {
    /// Create a PENDING pipeline with a fresh identifier and no stages
    pub fn new(name: impl Into<String>, deployment_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            deployment_id,
            created_at: lifecycle::now(),
            stages: Vec::new(),
            lifecycle: Lifecycle::new(RunStatus::Pending),
        }
    }

    /// Append a PENDING stage at the end of the pipeline
    pub fn add_stage(&mut self, name: impl Into<String>) -> &mut PipelineStage {
        let position = self.stages.len() as i32;
        self.stages.push(PipelineStage::new(self.id, name, position));
        let last = self.stages.len() - 1;
        &mut self.stages[last]
    }

    pub fn stage(&self, id: Uuid) -> Option<&PipelineStage> {
        self.stages.iter().find(|s| s.id == id)
    }

    pub fn stage_mut(&mut self, id: Uuid) -> Option<&mut PipelineStage> {
        self.stages.iter_mut().find(|s| s.id == id)
    }

    /// Cancel every open stage and every open step beneath them
    pub fn cancel_open_children(&mut self, at: DateTime<Utc>) -> usize {
        let steps: usize = self
            .stages
            .iter_mut()
            .map(|stage| stage.cancel_open_steps(at))
            .sum();
        steps + lifecycle::cancel_open(self.stages.iter_mut(), at)
    }
}

impl Stateful for Pipeline {
    type Status = RunStatus;
    const KIND: EntityKind = EntityKind::Pipeline;

    fn table() -> &'static TransitionTable<RunStatus> {
        &RUN_TABLE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn lifecycle(&self) -> &Lifecycle<RunStatus> {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle<RunStatus> {
        &mut self.lifecycle
    }
}

/// Ordered group of steps inside a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub name: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub steps: Vec<PipelineStep>,
    #[serde(flatten)]
    pub lifecycle: Lifecycle<RunStatus>,
}

impl PipelineStage {
    pub fn new(pipeline_id: Uuid, name: impl Into<String>, position: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id,
            name: name.into(),
            position,
            created_at: lifecycle::now(),
            steps: Vec::new(),
            lifecycle: Lifecycle::new(RunStatus::Pending),
        }
    }

    /// Append a PENDING step at the end of the stage
    pub fn add_step(&mut self, name: impl Into<String>) -> &mut PipelineStep {
        let position = self.steps.len() as i32;
        self.steps.push(PipelineStep::new(self.id, name, position));
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    pub fn step_mut(&mut self, id: Uuid) -> Option<&mut PipelineStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    pub fn cancel_open_steps(&mut self, at: DateTime<Utc>) -> usize {
        lifecycle::cancel_open(self.steps.iter_mut(), at)
    }
}

impl Stateful for PipelineStage {
    type Status = RunStatus;
    const KIND: EntityKind = EntityKind::PipelineStage;

    fn table() -> &'static TransitionTable<RunStatus> {
        &RUN_TABLE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn lifecycle(&self) -> &Lifecycle<RunStatus> {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle<RunStatus> {
        &mut self.lifecycle
    }
}

/// Single unit of work with an append-only log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub id: Uuid,
    pub stage_id: Uuid,
    pub name: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub logs: String,
    #[serde(flatten)]
    pub lifecycle: Lifecycle<RunStatus>,
}

impl PipelineStep {
    pub fn new(stage_id: Uuid, name: impl Into<String>, position: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage_id,
            name: name.into(),
            position,
            created_at: lifecycle::now(),
            logs: String::new(),
            lifecycle: Lifecycle::new(RunStatus::Pending),
        }
    }

    /// Append one timestamped line per input line
    pub fn append_logs(&mut self, entry: &str, at: DateTime<Utc>) {
        let stamp = at.to_rfc3339();
        for line in entry.lines() {
            self.logs.push_str(&stamp);
            self.logs.push_str(": ");
            self.logs.push_str(line);
            self.logs.push('\n');
        }
    }
}

impl Stateful for PipelineStep {
    type Status = RunStatus;
    const KIND: EntityKind = EntityKind::PipelineStep;

    fn table() -> &'static TransitionTable<RunStatus> {
        &RUN_TABLE
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn lifecycle(&self) -> &Lifecycle<RunStatus> {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle<RunStatus> {
        &mut self.lifecycle
    }

    // A failing step keeps the full reason in its log even though the error
    // message is bounded.
    fn after_transition(&mut self, operation: Operation, reason: Option<&str>, at: DateTime<Utc>) {
        if let (Operation::Fail, Some(reason)) = (operation, reason) {
            self.append_logs(reason, at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::RunLifecycle;

    fn pipeline() -> Pipeline {
        let mut pipeline = Pipeline::new("release", Uuid::new_v4());
        let build = pipeline.add_stage("build");
        build.add_step("compile");
        build.add_step("unit-tests");
        pipeline.add_stage("deploy").add_step("rollout");
        pipeline
    }

    #[test]
    fn test_pipeline_scenario() {
        let mut p = Pipeline::new("release", Uuid::new_v4());
        assert_eq!(p.status(), RunStatus::Pending);
        assert!(p.lifecycle.started_at().is_none());

        p.start().unwrap();
        assert_eq!(p.status(), RunStatus::InProgress);
        let t1 = p.lifecycle.started_at().unwrap();

        let err = p.start().unwrap_err();
        assert_eq!(err.kind, EntityKind::Pipeline);
        assert_eq!(err.entity_id, p.id);
        assert_eq!(p.status(), RunStatus::InProgress);
        assert_eq!(p.lifecycle.started_at(), Some(t1));

        p.complete().unwrap();
        assert_eq!(p.status(), RunStatus::Completed);
        let t2 = p.lifecycle.completed_at().unwrap();
        assert!(t2 >= t1);
    }

    #[test]
    fn test_stage_and_step_positions() {
        let p = pipeline();
        assert_eq!(p.stages.len(), 2);
        assert_eq!(p.stages[0].position, 0);
        assert_eq!(p.stages[1].position, 1);
        assert_eq!(p.stages[0].steps[1].name, "unit-tests");
        assert_eq!(p.stages[0].steps[1].position, 1);
        assert_eq!(p.stages[0].pipeline_id, p.id);
        assert_eq!(p.stages[0].steps[0].stage_id, p.stages[0].id);
    }

    #[test]
    fn test_cancelling_pipeline_leaves_children_alone() {
        let mut p = pipeline();
        p.start().unwrap();
        p.stages[0].start().unwrap();
        p.cancel().unwrap();

        assert_eq!(p.status(), RunStatus::Cancelled);
        assert_eq!(p.stages[0].status(), RunStatus::InProgress);
        assert_eq!(p.stages[1].status(), RunStatus::Pending);
    }

    #[test]
    fn test_cancel_open_children_reaches_steps() {
        let mut p = pipeline();
        p.stages[0].start().unwrap();
        p.stages[0].steps[0].start().unwrap();
        p.stages[0].steps[0].complete().unwrap();

        let changed = p.cancel_open_children(lifecycle::now());

        // two stages plus two of the three steps
        assert_eq!(changed, 4);
        assert_eq!(p.stages[0].steps[0].status(), RunStatus::Completed);
        assert_eq!(p.stages[0].steps[1].status(), RunStatus::Cancelled);
        assert_eq!(p.stages[1].status(), RunStatus::Cancelled);
        assert_eq!(p.stages[1].steps[0].status(), RunStatus::Cancelled);
    }

    #[test]
    fn test_step_fail_appends_reason_to_logs() {
        let mut p = pipeline();
        let step = &mut p.stages[0].steps[0];
        step.append_logs("cargo build --release", lifecycle::now());
        step.start().unwrap();
        step.fail(Some("linker exited with code 1")).unwrap();

        assert_eq!(step.status(), RunStatus::Failed);
        assert_eq!(step.lifecycle.error_message(), Some("linker exited with code 1"));
        let lines: Vec<_> = step.logs.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(": cargo build --release"));
        assert!(lines[1].ends_with(": linker exited with code 1"));
    }

    #[test]
    fn test_rejected_fail_does_not_touch_logs() {
        let mut p = pipeline();
        let step = &mut p.stages[0].steps[0];
        assert!(step.fail(Some("too early")).is_err());
        assert!(step.logs.is_empty());
    }

    #[test]
    fn test_pipeline_json_round_trip() {
        let mut p = pipeline();
        p.start().unwrap();
        p.stages[0].start().unwrap();
        p.stages[0].complete().unwrap();

        let json = serde_json::to_string(&p).unwrap();
        let back: Pipeline = serde_json::from_str(&json).unwrap();

        assert_eq!(back, p);
        assert_eq!(back.stages[0].lifecycle.completed_at(), p.stages[0].lifecycle.completed_at());
    }
}
