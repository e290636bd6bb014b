/// Position management: trailing stops with a ratchet invariant
///
/// **Key Design Principles:**
/// 1. The tracker returns **actions**, never talks to the exchange
/// 2. **Ratchet invariant**: stops may rise, never fall
/// 3. ATR is fixed at entry; only a restart may recompute it
/// 4. Removal is gated on a confirmed sell
///
/// **Module Structure:**
/// - `intent`: Actions handed to the controller
/// - `ratchet`: Trailing stop enforcement
/// - `book`: Pair-keyed position storage
/// - `tracker`: The per-pair state machine
pub mod book;
pub mod intent;
pub mod ratchet;
pub mod tracker;

pub use book::PositionBook;
pub use intent::Action;
pub use ratchet::{StopChange, TrailingStop};
pub use tracker::{PositionTracker, TrackerError};
