pub mod delay;
pub mod timer;
pub mod waiter;

pub use delay::{Cancelled, delay, delay_ms};
pub use timer::{CalibrationStats, HighPrecisionTimer, Timer};
pub use waiter::{EventWaiter, PendingWait, Signals, WaiterState};

pub use tokio_util::sync::CancellationToken;
