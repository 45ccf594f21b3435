//! Back-ends shipped with the fuzzer.

pub mod cross;
pub mod smt2;
pub mod stub;

pub use cross::CrossCheckSolver;
pub use smt2::Smt2Solver;
pub use stub::{StubBug, StubSolver};
