mod round;

pub use round::{EventContext, RoundState, Shutdown, Verdict};
