use tracing::{info, warn};

use super::exec::{CommandRunner, Invocation};
use crate::errors::{Context, Error};

/// One sub-step of a tool workflow. Failure of a non-required step is logged
/// and the plan moves on.
#[derive(Clone, Debug)]
pub struct Step {
    pub description: String,
    pub invocation: Invocation,
    pub required: bool,
}

impl Step {
    pub fn required(description: &str, invocation: Invocation) -> Self {
        Step {
            description: description.to_string(),
            invocation,
            required: true,
        }
    }

    pub fn best_effort(description: &str, invocation: Invocation) -> Self {
        Step {
            description: description.to_string(),
            invocation,
            required: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Tolerated(String),
}

/// Run `steps` in order, streaming their output. The first required failure
/// aborts the plan.
pub async fn run_plan<R: CommandRunner + ?Sized>(
    runner: &R,
    steps: &[Step],
) -> Result<Vec<StepOutcome>, Error> {
    let mut outcomes = Vec::with_capacity(steps.len());
    for step in steps {
        info!(step = %step.description, "Running");
        match runner.stream(&step.invocation).await {
            Ok(()) => outcomes.push(StepOutcome::Succeeded),
            Err(e) if !step.required => {
                warn!(step = %step.description, error = %e, "Best-effort step failed (non-fatal)");
                outcomes.push(StepOutcome::Tolerated(e.to_string()));
            }
            Err(e) => return Err(e).context(&step.description),
        }
    }
    Ok(outcomes)
}
