mod keeper;
mod timestamp;

pub use keeper::{Stepper, TerminationCondition, TimeKeeper};
pub use timestamp::{
    COMPARABLE_HALF_WINDOW, FloatTimestamp, Timestamp, TimestampWindow, Timestamped, WindowError,
};
