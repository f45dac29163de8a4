pub mod csv_loader;
pub mod in_memory;
pub mod results_log;
pub mod rule_cache;

pub use in_memory::{InMemoryPartitionSource, OrderHistory, PartitionedOrderStore};
pub use results_log::{JsonLinesResultsSink, TracingResultsSink};
pub use rule_cache::InMemoryRuleCache;
