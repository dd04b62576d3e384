pub mod calendar;
pub mod gates;

pub use calendar::{target_day, TargetDay};
pub use gates::{GateInstants, GateTimes};
