// TASALIGN -- TAS GATE SCHEDULE ALIGNMENT
// COARSE-TO-FINE SEARCH FOR AN IEEE 802.1Qbv GATE WINDOW THAT LINES UP WITH
// A PERIODIC SENSOR STREAM, WITH BOUNDED APPLY RETRY, SOAK VALIDATION AND A
// SUPERVISOR THAT ALWAYS LEAVES THE PORT IN A KNOWN STATE.
//
// PURE LOGIC LIVES HERE; src/main.rs AND src/cli/ ARE THE THIN BINARY.

pub mod applier;
pub mod clock;
pub mod config;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod report;
pub mod retry;
pub mod schedule;
pub mod scorer;
pub mod search;
pub mod sensor;
pub mod sim;
pub mod supervisor;
pub mod telemetry;
pub mod timebase;

pub use error::{Result, TasError};
