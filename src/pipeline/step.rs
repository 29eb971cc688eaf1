use serde::{Deserialize, Serialize};

/// The fixed stages of a run: a mandatory foundation step and two optional
/// enrichment steps, in declared order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Template,
    Diagram,
    Cost,
}

impl StepKind {
    pub const ORDERED: [StepKind; 3] = [StepKind::Template, StepKind::Diagram, StepKind::Cost];

    pub fn name(self) -> &'static str {
        match self {
            StepKind::Template => "template",
            StepKind::Diagram => "diagram",
            StepKind::Cost => "cost",
        }
    }
}

#[derive(Clone, Debug)]
pub struct PipelineStep {
    pub kind: StepKind,
    pub enabled: bool,
    pub prompt: String,
}

impl PipelineStep {
    pub fn new(kind: StepKind, prompt: impl Into<String>) -> Self {
        Self {
            kind,
            enabled: true,
            prompt: prompt.into(),
        }
    }
}

/// The ordered step sequence for one run, with per-run enable flags.
#[derive(Clone, Debug)]
pub struct PipelinePlan {
    steps: Vec<PipelineStep>,
}

impl PipelinePlan {
    /// Template, then diagram, then cost estimate.
    pub fn standard() -> Self {
        Self {
            steps: vec![
                PipelineStep::new(
                    StepKind::Template,
                    "Generate an infrastructure template for the stated requirement. \
                     Declare every resource explicitly.",
                ),
                PipelineStep::new(
                    StepKind::Diagram,
                    "Produce an architecture diagram covering the components of the \
                     solution and the data flows between them.",
                ),
                PipelineStep::new(
                    StepKind::Cost,
                    "Estimate the monthly cost of the proposed architecture and list \
                     the main cost drivers.",
                ),
            ],
        }
    }

    pub fn enable(mut self, kind: StepKind, enabled: bool) -> Self {
        for step in &mut self.steps {
            if step.kind == kind {
                step.enabled = enabled;
            }
        }
        self
    }

    pub fn with_prompt(mut self, kind: StepKind, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        for step in &mut self.steps {
            if step.kind == kind {
                step.prompt = prompt.clone();
            }
        }
        self
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }
}

impl Default for PipelinePlan {
    fn default() -> Self {
        Self::standard()
    }
}

/// Caller-facing record for one step of a run.
///
/// `skipped` distinguishes "intentionally not run" from "ran and failed";
/// downstream consumers need the difference.
#[derive(Clone, Debug, Serialize)]
pub struct StepResult {
    pub step: String,
    pub success: bool,
    pub skipped: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl StepResult {
    pub fn skipped(kind: StepKind) -> Self {
        Self {
            step: kind.name().to_string(),
            success: false,
            skipped: true,
            content: String::new(),
            error: None,
            digest: None,
        }
    }

    pub fn success(kind: StepKind, content: String, digest: String) -> Self {
        Self {
            step: kind.name().to_string(),
            success: true,
            skipped: false,
            content,
            error: None,
            digest: Some(digest),
        }
    }

    pub fn failure(kind: StepKind, error: String) -> Self {
        Self {
            step: kind.name().to_string(),
            success: false,
            skipped: false,
            content: String::new(),
            error: Some(error),
            digest: None,
        }
    }
}
