//! Simulated broker: fill matching, slippage and commission.

pub mod commission;
pub mod simulated;
pub mod slippage;
pub mod trigger;

pub use commission::{
    Commission, CommissionConfig, CommissionModel, CommissionModelConfig, CommissionTier,
};
pub use simulated::{BrokerError, BrokerStats, SimulatedBroker};
pub use slippage::{SlippageConfig, SlippageModel};
pub use trigger::{check_trigger, MarketFillPrice, TriggerResult};
