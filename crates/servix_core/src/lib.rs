pub mod master;
pub mod shutdown;
pub mod worker;

pub use master::{BoundMaster, DrainOutcome, Master, StartupError};
pub use shutdown::{ShutdownController, ShutdownSignal, ShutdownState};
