pub mod engine;
pub mod blast_radius;
pub mod cycles;
pub mod dead_code;

pub use engine::{GraphStats, QueryEngine};
pub use blast_radius::{AffectedEntity, BlastRadius, BlastRadiusSummary};
pub use cycles::{Cycle, CycleOptions, CycleReport, CycleSummary};
pub use dead_code::{Confidence, DeadCodeFinding, DeadCodeOptions, DeadCodeReport, DeadCodeSummary};
