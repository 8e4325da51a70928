//! The research pipeline.
//!
//! Bottom-up: [`sources`] and [`stitch`] shape raw search output,
//! [`summarize`] condenses long page content, [`unit`] executes one
//! bounded sub-task, [`supervisor`] drives concurrent units in rounds, and
//! [`orchestrator`] sequences the whole run.

pub mod orchestrator;
pub mod sources;
pub mod stitch;
pub mod summarize;
pub mod supervisor;
pub mod unit;

pub use orchestrator::{ResearchEngine, RunHandle, RunOutcome};
pub use supervisor::Supervisor;
pub use unit::{ResearchUnit, ResearchUnitTask};
