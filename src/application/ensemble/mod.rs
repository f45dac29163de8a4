//! The MDAR ensemble: per-approach hit statistics, slot allocation and offset
//! rotation over the recommendation strategies.

mod allocation;
mod hit_model;
mod mdar;

pub use allocation::{allocate_slots, rotation_offset};
pub use hit_model::{HitModel, HitRecorder, StatsByApproach};
pub use mdar::Mdar;
pub(crate) use mdar::BasketBuffer;
