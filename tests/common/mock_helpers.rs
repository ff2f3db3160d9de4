//! Mock stages with observable counters

use neurochain::pipeline::{
    scalar_fingerprint, AttributeValue, InitContext, NodeRole, ParamValue, Stage, StageContract,
    StageError, StageResult, UpdateContext,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Counters shared between a `MockStage` and the test that built it.
#[derive(Debug, Default)]
pub struct Counters {
    pub initializations: AtomicU64,
    pub resets: AtomicU64,
    pub updates: AtomicU64,
    pub invalidations: AtomicU64,
    /// `(start, end)` of every update.
    pub spans: Mutex<Vec<(Instant, Instant)>>,
}

impl Counters {
    pub fn initializations(&self) -> u64 {
        self.initializations.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }

    pub fn spans(&self) -> Vec<(Instant, Instant)> {
        self.spans.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Configurable stage.
///
/// Every published attribute is also a parameter, so tests change what a
/// node publishes with `set_parameter`. The `fail` parameter makes `update`
/// return a compute error.
pub struct MockStage {
    name: String,
    role: NodeRole,
    published: Vec<&'static str>,
    observed: Vec<&'static str>,
    reset_params: Vec<&'static str>,
    params: BTreeMap<String, ParamValue>,
    work: Duration,
    contract: StageContract,
    counters: Arc<Counters>,
}

impl MockStage {
    fn new(name: &str, role: NodeRole) -> Self {
        let mut params = BTreeMap::new();
        params.insert("fail".to_string(), ParamValue::Bool(false));
        params.insert("level".to_string(), ParamValue::Int(0));
        Self {
            name: name.to_string(),
            role,
            published: Vec::new(),
            observed: Vec::new(),
            reset_params: Vec::new(),
            params,
            work: Duration::ZERO,
            contract: StageContract::empty(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn source(name: &str) -> Self {
        Self::new(name, NodeRole::Source)
    }

    pub fn processor(name: &str) -> Self {
        Self::new(name, NodeRole::Processor)
    }

    pub fn output(name: &str) -> Self {
        Self::new(name, NodeRole::Output)
    }

    pub fn publishes(mut self, attribute: &'static str, value: f64) -> Self {
        self.published.push(attribute);
        self.params
            .insert(attribute.to_string(), ParamValue::Float(value));
        self.rebuild_contract()
    }

    pub fn observes(mut self, attribute: &'static str) -> Self {
        self.observed.push(attribute);
        self.rebuild_contract()
    }

    /// Make `level` a local-reset parameter.
    pub fn resets_on_level(mut self) -> Self {
        self.reset_params.push("level");
        self.rebuild_contract()
    }

    /// Busy time spent in every update.
    pub fn with_work(mut self, work: Duration) -> Self {
        self.work = work;
        self
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    fn rebuild_contract(mut self) -> Self {
        let mut builder = StageContract::builder().resets_on(&self.reset_params);
        for attribute in &self.observed {
            builder = builder.observes(*attribute, scalar_fingerprint);
        }
        self.contract = builder.build().expect("mock contract");
        self
    }
}

impl Stage for MockStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn role(&self) -> NodeRole {
        self.role
    }

    fn contract(&self) -> &StageContract {
        &self.contract
    }

    fn attribute(&self, name: &str) -> Option<AttributeValue> {
        if !self.published.iter().any(|p| *p == name) {
            return None;
        }
        self.params
            .get(name)
            .and_then(ParamValue::as_float)
            .map(AttributeValue::Float)
    }

    fn parameter(&self, name: &str) -> Option<ParamValue> {
        self.params.get(name).cloned()
    }

    fn validate_parameter(&self, name: &str, value: &ParamValue) -> Result<(), String> {
        match (name, value) {
            ("fail", ParamValue::Bool(_)) | ("level", ParamValue::Int(_)) => Ok(()),
            ("fail", _) | ("level", _) => Err(format!("wrong type for '{name}'")),
            (_, v) if v.as_float().is_some() => Ok(()),
            _ => Err("published attributes are numeric".to_string()),
        }
    }

    fn apply_parameter(&mut self, name: &str, value: ParamValue) {
        self.params.insert(name.to_string(), value);
    }

    fn initialize(&mut self, ctx: &InitContext) -> StageResult<()> {
        for attribute in &self.observed {
            ctx.resolve(attribute)?;
        }
        self.counters.initializations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn reset(&mut self) -> StageResult<()> {
        self.counters.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn update(&mut self, ctx: &mut UpdateContext) -> StageResult<()> {
        let start = Instant::now();
        if self.params.get("fail") == Some(&ParamValue::Bool(true)) {
            return Err(StageError::compute(format!("{} failed on purpose", self.name)));
        }
        while start.elapsed() < self.work {
            std::hint::spin_loop();
        }

        match ctx.input {
            Some(input) => ctx.output.copy_from(input),
            None => {
                ctx.output.resize(1, 1);
                ctx.output.set(0, 0, ctx.tick as f64);
            }
        }

        self.counters.updates.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut spans) = self.counters.spans.lock() {
            spans.push((start, Instant::now()));
        }
        Ok(())
    }

    fn on_input_history_invalidation(&mut self) {
        self.counters.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}
