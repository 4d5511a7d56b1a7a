//! Option mapping: classification, planning, persistence and review.

pub mod classifier;
pub mod diff;
pub mod engine;
pub mod report;
pub mod types;

pub use classifier::{classify_grouping, classify_option, Classification, GroupingMappingStatus};
pub use diff::{detect_change_kind, MetaDiff};
pub use engine::{plan_mapping, MappingCompletion, MappingResult, OptionMappingEngine};
pub use report::{DataSetVersionMappingMeta, MetaSummary};
pub use types::{GroupingRef, ManualDecision, MappingKey, MappingType, OptionMapping};
