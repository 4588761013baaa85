//! Contract terms: enumerated attribute values, typed terms per contract kind
//! and the JSON loader that produces them

mod contract;
mod data;
mod loader;

pub use contract::{
    AmortizerTerms, CallMoneyTerms, CommonTerms, Contract, Conventions, ExoticAmortizerTerms, FeeTerms,
    InterestBaseTerms, InterestTerms, LoanTerms, OptionTerms, PamTerms, PrincipalLeg, RateLeg, RateResetTerms,
    Recurrence, ScalingTerms, Settlement, StockTerms, SwapTerms, SwitchTerms,
};
pub use data::{
    BoundaryDirection, BoundaryEffect, ContractPerformance, ContractRole, ContractType, DeliverySettlement,
    FeeBasis, FixedVariable, IncreaseDecrease, InterestCalculationBase, LegRole, OptionExerciseType, OptionType,
    ScalingEffect,
};
pub use loader::{
    load_terms, parse_datetime, parse_terms, to_contracts, ContractResolver, Lenient, ListValue, NoReferences,
    RawReference, RawTerms, MAX_STRUCTURE_DEPTH,
};
