//! Structural validation of a planner-generated step list, mirroring the
//! checks `gator-core::plan::parser` runs over a parsed `plan.toml`.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanValidationError {
    #[error("plan has no steps")]
    NoSteps,
    #[error("step {0} has an empty description")]
    EmptyStepDescription(usize),
    #[error("plan has {0} steps, exceeding the maximum of {1}")]
    TooManySteps(usize, usize),
}

pub const MAX_STEPS: usize = 50;

pub fn validate_steps(steps: &[String]) -> Result<(), PlanValidationError> {
    if steps.is_empty() {
        return Err(PlanValidationError::NoSteps);
    }
    if steps.len() > MAX_STEPS {
        return Err(PlanValidationError::TooManySteps(steps.len(), MAX_STEPS));
    }
    for (i, step) in steps.iter().enumerate() {
        if step.trim().is_empty() {
            return Err(PlanValidationError::EmptyStepDescription(i));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_steps() {
        let steps = vec!["write tests".to_string(), "implement".to_string()];
        assert!(validate_steps(&steps).is_ok());
    }

    #[test]
    fn rejects_empty_step_list() {
        assert_eq!(validate_steps(&[]).unwrap_err(), PlanValidationError::NoSteps);
    }

    #[test]
    fn rejects_blank_step_description() {
        let steps = vec!["ok".to_string(), "   ".to_string()];
        assert_eq!(
            validate_steps(&steps).unwrap_err(),
            PlanValidationError::EmptyStepDescription(1)
        );
    }

    #[test]
    fn rejects_excessive_step_count() {
        let steps: Vec<String> = (0..MAX_STEPS + 1).map(|i| format!("step {i}")).collect();
        assert!(matches!(
            validate_steps(&steps).unwrap_err(),
            PlanValidationError::TooManySteps(_, _)
        ));
    }
}
