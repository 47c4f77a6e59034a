pub mod raw;
pub mod request;
pub mod result;
pub mod task;

pub use raw::RawOutput;
pub use request::{ModelRef, SimulationRequest};
pub use result::{Signal, SimulationOutcome, TimeSeries};
pub use task::{SimulationTask, TaskPriority, TaskState};
