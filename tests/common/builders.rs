//! Test pipeline builders

use super::mock_helpers::{Counters, MockStage};
use neurochain::pipeline::{AnyStage, NodeId, Pipeline};
use std::collections::HashMap;
use std::sync::Arc;

/// A pipeline of `MockStage`s plus the counters of every node, by name.
pub struct MockPipeline {
    pub pipeline: Pipeline,
    pub ids: HashMap<&'static str, NodeId>,
    pub counters: HashMap<&'static str, Arc<Counters>>,
}

impl MockPipeline {
    pub fn id(&self, name: &str) -> NodeId {
        self.ids[name]
    }

    pub fn counters(&self, name: &str) -> &Counters {
        &self.counters[name]
    }
}

/// Builder for pipelines of mock stages, addressed by name.
pub struct MockPipelineBuilder {
    inner: MockPipeline,
}

impl MockPipelineBuilder {
    pub fn new(name: &'static str, source: MockStage) -> Self {
        let mut inner = MockPipeline {
            pipeline: Pipeline::new(),
            ids: HashMap::new(),
            counters: HashMap::new(),
        };
        inner.counters.insert(name, source.counters());
        let id = inner
            .pipeline
            .set_source(AnyStage::plugin(source))
            .expect("source");
        inner.ids.insert(name, id);
        Self { inner }
    }

    pub fn processor(mut self, name: &'static str, stage: MockStage) -> Self {
        self.inner.counters.insert(name, stage.counters());
        let id = self
            .inner
            .pipeline
            .add_processor(AnyStage::plugin(stage))
            .expect("processor");
        self.inner.ids.insert(name, id);
        self
    }

    /// Attach an output to the named node, or to the chain tail when `None`.
    pub fn output(mut self, name: &'static str, stage: MockStage, at: Option<&str>) -> Self {
        self.inner.counters.insert(name, stage.counters());
        let attach_to = at.map(|n| self.inner.ids[n]);
        let id = self
            .inner
            .pipeline
            .add_output(AnyStage::plugin(stage), attach_to)
            .expect("output");
        self.inner.ids.insert(name, id);
        self
    }

    pub fn build(self) -> MockPipeline {
        self.inner
    }

    pub fn initialized(mut self) -> MockPipeline {
        self.inner.pipeline.initialize_all().expect("initialize_all");
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_pipeline_builder() {
        let mock = MockPipelineBuilder::new("src", MockStage::source("src"))
            .processor("p", MockStage::processor("p"))
            .output("o", MockStage::output("o"), Some("src"))
            .build();

        assert_eq!(mock.pipeline.len(), 3);
        assert_eq!(
            mock.pipeline.node(mock.id("o")).unwrap().upstream(),
            Some(mock.id("src"))
        );
    }
}
