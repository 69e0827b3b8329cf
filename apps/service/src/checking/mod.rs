/// Check engine and batch orchestration.
///
/// This module decides, for one endpoint, whether it is up and why not
/// (`engine`), and runs many such checks per polling cycle without letting
/// one slow endpoint stall the rest or the caller (`orchestrator`).
pub mod engine;
pub mod instrument;
pub mod orchestrator;
pub mod types;

pub use engine::{Checker, ProtocolChecker};
pub use instrument::InstrumentedChecker;
pub use orchestrator::{BatchEvent, Orchestrator};
pub use types::{Category, CheckConfig, CheckOutcome};
