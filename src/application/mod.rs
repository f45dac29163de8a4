// Association rule mining
pub mod mining;

// Recommendation strategies
pub mod strategies;

// Ensemble training and blending
pub mod ensemble;

// Evaluation and cross-validation
pub mod evaluation;
