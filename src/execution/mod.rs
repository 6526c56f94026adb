//! Execution layer - Order lifecycle, position bookkeeping, paper matching

pub mod matching;
pub mod orders;
pub mod positions;

pub use matching::PaperMatcher;
pub use orders::{FillOutcome, OrderLifecycleManager};
pub use positions::{ClosedPortion, PositionFill, PositionManager, TickOutcome};
