//! Signal → order conversion: position sizing and rule-level deduplication.

pub mod policy;
pub mod sizer;

pub use policy::{OppositeSignalPolicy, SizingPolicy};
pub use sizer::{ActiveSignal, DropReason, DroppedSignal, SignalSizer, SizerConfig, SizerStats};
