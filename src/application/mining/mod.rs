mod rule_miner;

pub use rule_miner::{Basket, ItemsetSearch, MiningParams, RuleMiner};
