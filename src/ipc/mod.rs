//! Isolated execution of test cases in worker processes
//!
//! The driver and the worker share one POSIX shared memory region per
//! invocation. The driver writes a startup envelope, the worker replaces it
//! with a result, and the driver reads it back after reaping the worker.

pub mod driver;
pub mod process;
pub mod protocol;
pub mod shm;
pub mod transport;
pub mod worker;

pub use driver::{Driver, Executor};
pub use protocol::{PerformanceSample, StartupEnvelope, TestResult};
