//! Declarative change-tracking contract of a stage.
//!
//! A `StageContract` lists which of the stage's own parameters only need a
//! lightweight `reset()` when they change, and which upstream attributes the
//! stage was initialized against. A change in any observed attribute (as seen
//! through its fingerprint) requires a full reinitialization.
//!
//! Contracts are built once per stage instance. `build()` validates them
//! right away; `finish()` defers the check to attachment, where the pipeline
//! validates every stage's contract before inserting it.

use crate::pipeline::attribute::{AttributeValue, Fingerprint, FingerprintFn};
use crate::pipeline::error::{PipelineError, PipelineResult};
use std::collections::HashSet;

/// An upstream attribute the stage depends on.
#[derive(Clone)]
pub struct ObservedAttribute {
    pub name: &'static str,
    pub fingerprint: FingerprintFn,
}

impl std::fmt::Debug for ObservedAttribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservedAttribute")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ObservedAttribute {
    pub fn fingerprint_of(&self, value: &AttributeValue) -> Fingerprint {
        (self.fingerprint)(value)
    }
}

/// Local-reset parameters and upstream-observed attributes of a stage.
#[derive(Debug, Clone, Default)]
pub struct StageContract {
    reset_params: Vec<&'static str>,
    observed: Vec<ObservedAttribute>,
}

impl StageContract {
    /// Contract with no reset parameters and no observed attributes.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> StageContractBuilder {
        StageContractBuilder::default()
    }

    /// Parameters whose change requires `reset()`.
    pub fn reset_params(&self) -> &[&'static str] {
        &self.reset_params
    }

    pub fn requires_reset(&self, param: &str) -> bool {
        self.reset_params.iter().any(|p| *p == param)
    }

    /// Upstream attributes whose change requires reinitialization.
    pub fn observed(&self) -> &[ObservedAttribute] {
        &self.observed
    }

    pub fn observes(&self, attribute: &str) -> bool {
        self.observed.iter().any(|o| o.name == attribute)
    }

    /// Reject empty or duplicate names.
    pub fn validate(&self) -> PipelineResult<()> {
        let mut seen = HashSet::new();
        for name in &self.reset_params {
            if name.is_empty() {
                return Err(PipelineError::InvalidContract(
                    "empty reset parameter name".to_string(),
                ));
            }
            if !seen.insert(*name) {
                return Err(PipelineError::InvalidContract(format!(
                    "reset parameter '{name}' declared twice"
                )));
            }
        }

        let mut seen = HashSet::new();
        for observed in &self.observed {
            if observed.name.is_empty() {
                return Err(PipelineError::InvalidContract(
                    "empty observed attribute name".to_string(),
                ));
            }
            if !seen.insert(observed.name) {
                return Err(PipelineError::InvalidContract(format!(
                    "observed attribute '{}' declared twice",
                    observed.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct StageContractBuilder {
    reset_params: Vec<&'static str>,
    observed: Vec<ObservedAttribute>,
}

impl StageContractBuilder {
    /// Parameters whose change puts the node in `NeedsReset`.
    pub fn resets_on(mut self, params: &[&'static str]) -> Self {
        self.reset_params.extend_from_slice(params);
        self
    }

    /// Observe an upstream attribute, compared through `fingerprint`.
    pub fn observes(mut self, name: &'static str, fingerprint: FingerprintFn) -> Self {
        self.observed.push(ObservedAttribute { name, fingerprint });
        self
    }

    /// Finish without validating; the contract is checked when the stage
    /// is attached to a pipeline.
    pub fn finish(self) -> StageContract {
        StageContract {
            reset_params: self.reset_params,
            observed: self.observed,
        }
    }

    pub fn build(self) -> PipelineResult<StageContract> {
        let contract = self.finish();
        contract.validate()?;
        Ok(contract)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::attribute::{layout_fingerprint, scalar_fingerprint};

    #[test]
    fn test_builder() {
        let contract = StageContract::builder()
            .resets_on(&["buffer_length", "take_abs"])
            .observes("channel_layout", layout_fingerprint)
            .observes("source_name", scalar_fingerprint)
            .build()
            .unwrap();

        assert!(contract.requires_reset("take_abs"));
        assert!(!contract.requires_reset("gain"));
        assert!(contract.observes("channel_layout"));
        assert!(!contract.observes("dtype"));
        assert_eq!(contract.observed().len(), 2);
    }

    #[test]
    fn test_duplicate_observed_rejected() {
        let err = StageContract::builder()
            .observes("sampling_rate", scalar_fingerprint)
            .observes("sampling_rate", scalar_fingerprint)
            .build()
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidContract(_)));
    }

    #[test]
    fn test_duplicate_reset_param_rejected() {
        assert!(StageContract::builder()
            .resets_on(&["a", "a"])
            .build()
            .is_err());
        assert!(StageContract::builder().resets_on(&[""]).build().is_err());
    }

    #[test]
    fn test_finish_defers_validation() {
        let contract = StageContract::builder()
            .observes("dtype", scalar_fingerprint)
            .observes("dtype", scalar_fingerprint)
            .finish();
        assert_eq!(contract.observed().len(), 2);
        assert!(matches!(
            contract.validate(),
            Err(PipelineError::InvalidContract(_))
        ));
    }
}
