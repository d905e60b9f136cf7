use std::sync::Arc;

use crate::{
    dispatch::{AlgorithmRegistry, VitMatteEstimator},
    pipeline::MattingPipeline,
    traits::{AlphaEstimator, AlphaSolver, ForegroundSolver, NeuralMattingModel},
    types::Algorithm,
};

/// Builder for creating matting pipelines with a fluent API
pub struct MattingPipelineBuilder {
    registry: AlgorithmRegistry,
    foreground_solver: Option<Arc<dyn ForegroundSolver>>,
    vitmatte_model: Option<Arc<dyn NeuralMattingModel>>,
}

impl Default for MattingPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MattingPipelineBuilder {
    /// Create a new pipeline builder
    pub fn new() -> Self {
        Self {
            registry: AlgorithmRegistry::new(),
            foreground_solver: None,
            vitmatte_model: None,
        }
    }

    /// Register a classical solver for `algorithm` (replaces any existing one)
    pub fn with_solver<S>(self, algorithm: Algorithm, solver: S) -> Self
    where
        S: AlphaSolver + 'static,
    {
        self.with_shared_solver(algorithm, Arc::new(solver))
    }

    pub fn with_shared_solver(mut self, algorithm: Algorithm, solver: Arc<dyn AlphaSolver>) -> Self {
        self.registry.register_solver(algorithm, solver);
        self
    }

    /// Register a custom estimator for `algorithm`
    pub fn with_estimator<E>(mut self, algorithm: Algorithm, estimator: E) -> Self
    where
        E: AlphaEstimator + 'static,
    {
        self.registry.register(algorithm, Arc::new(estimator));
        self
    }

    /// Set the foreground solver. Without one the result carries no foreground layer.
    pub fn with_foreground_solver<F>(self, solver: F) -> Self
    where
        F: ForegroundSolver + 'static,
    {
        self.with_shared_foreground_solver(Arc::new(solver))
    }

    pub fn with_shared_foreground_solver(mut self, solver: Arc<dyn ForegroundSolver>) -> Self {
        self.foreground_solver = Some(solver);
        self
    }

    /// Drop foreground recovery
    pub fn without_foreground(mut self) -> Self {
        self.foreground_solver = None;
        self
    }

    /// Inject the neural matting model used by `vitmatte`.
    pub fn with_vitmatte_model(mut self, model: Arc<dyn NeuralMattingModel>) -> Self {
        self.vitmatte_model = Some(model);
        self
    }

    /// Build the pipeline.
    ///
    /// `vitmatte` is always registered; without an injected model it fails
    /// with `ModelUnavailable` at request time.
    pub fn build(self) -> MattingPipeline {
        let mut registry = self.registry;
        if !registry.contains(Algorithm::VitMatte) {
            registry.register(Algorithm::VitMatte, Arc::new(VitMatteEstimator::new(self.vitmatte_model)));
        }
        MattingPipeline::new(registry, self.foreground_solver)
    }
}
