//! Gain: scales every sample by a constant factor.

use crate::pipeline::attribute::{layout_fingerprint, names};
use crate::pipeline::contract::StageContract;
use crate::pipeline::error::{StageError, StageResult};
use crate::pipeline::node::{InitContext, NodeRole, Stage, UpdateContext};
use crate::pipeline::param::ParamValue;

/// Gain processor. Changing `gain` takes effect on the next chunk without a reset.
pub struct Gain {
    gain: f64,
    /// Channel count of the layout this node was initialized against.
    channel_count: usize,
    contract: StageContract,
}

impl Gain {
    pub fn new(gain: f64) -> Self {
        let contract = StageContract::builder()
            .observes(names::CHANNEL_LAYOUT, layout_fingerprint)
            .finish();
        Self {
            gain,
            channel_count: 0,
            contract,
        }
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }
}

impl Stage for Gain {
    fn name(&self) -> &str {
        "Gain"
    }

    fn role(&self) -> NodeRole {
        NodeRole::Processor
    }

    fn contract(&self) -> &StageContract {
        &self.contract
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        match name {
            "gain" => Some(ParamValue::Float(self.gain)),
            _ => None,
        }
    }

    fn validate_parameter(&self, name: &str, value: &ParamValue) -> Result<(), String> {
        match (name, value.as_float()) {
            ("gain", Some(v)) if v.is_finite() => Ok(()),
            ("gain", _) => Err("gain must be a finite number".to_string()),
            _ => Ok(()),
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) {
        if name == "gain" {
            if let Some(v) = value.as_float() {
                self.gain = v;
            }
        }
    }

    fn initialize(&mut self, ctx: &InitContext) -> StageResult<()> {
        let layout = ctx.resolve(names::CHANNEL_LAYOUT)?;
        self.channel_count = layout
            .as_layout()
            .map(|l| l.channel_count())
            .ok_or_else(|| StageError::compute("channel_layout is not a layout"))?;
        Ok(())
    }

    fn update(&mut self, ctx: &mut UpdateContext) -> StageResult<()> {
        let input = ctx.require_input()?;
        if input.rows() != self.channel_count {
            return Err(StageError::compute(format!(
                "expected {} channels, got {}",
                self.channel_count,
                input.rows()
            )));
        }
        ctx.output.copy_from(input);
        let gain = self.gain;
        ctx.output.map_in_place(|v| v * gain);
        Ok(())
    }
}
