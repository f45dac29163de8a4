// Orders, items and time attributes
pub mod types;

// K-fold time partitioning
pub mod partition;

// Association rules
pub mod rules;

// Confusion matrix, IR measures and hit statistics
pub mod metrics;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
