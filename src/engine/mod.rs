//! Policy session: working set, cached masks, toggles and change fan-out.

pub mod capabilities;
pub mod controller;
pub mod session;

pub use capabilities::{Capabilities, EngineVariant, OfflineApps};
pub use controller::{DiscardReason, RowBinding, ToggleOutcome};
pub use session::{AppRow, EditBatch, PolicySession, SwitchState};
