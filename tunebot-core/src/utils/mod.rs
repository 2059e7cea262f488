pub mod time;
pub mod timer;

pub use time::{Clock, SystemClock};
pub use timer::{SingleSlotTimer, TimerToken};
