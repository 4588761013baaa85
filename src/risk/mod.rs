//! Risk factor observation: the interface, market data and behavior models

mod behavior;
mod loader;
mod market;
mod observer;

pub use behavior::{
    BehaviorInput, BehaviorModel, BehaviorRegistry, DepositTransactionModel, Surface,
    TwoDimensionalPrepaymentModel,
};
pub use loader::{load_market_directory, load_surface, load_time_series, load_time_series_from_reader};
pub use market::{MarketModel, TimeSeries};
pub use observer::{Callout, CalloutKind, ContractStart, RiskFactorObserver};
