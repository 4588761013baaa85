//! State space threaded through contract evaluation

use chrono::NaiveDateTime;

use crate::terms::ContractPerformance;

/// Flags of the boundary controlled switch
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundaryState {
    /// Monitoring events still test the boundary
    pub monitored: bool,
    /// The boundary has been crossed
    pub crossed: bool,
    pub first_leg_active: bool,
    pub second_leg_active: bool,
}

/// State of a contract at a point in time during evaluation.
///
/// Signed quantities (notional, accrued interest, redemption amount) carry
/// the contract-role sign fixed at initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpace {
    /// Time of the last evaluated event
    pub status_date: NaiveDateTime,
    pub maturity_date: Option<NaiveDateTime>,

    pub notional_principal: f64,
    pub nominal_interest_rate: f64,
    pub accrued_interest: f64,

    /// Floating leg rate and accrual (swaps)
    pub nominal_interest_rate2: f64,
    pub accrued_interest2: f64,

    pub fee_accrued: f64,
    pub notional_scaling_multiplier: f64,
    pub interest_scaling_multiplier: f64,
    pub interest_calculation_base_amount: f64,
    pub next_principal_redemption_payment: f64,
    pub contract_performance: ContractPerformance,

    // Options
    pub exercise_amount: Option<f64>,
    pub exercise_date: Option<NaiveDateTime>,

    pub boundary: BoundaryState,
}

impl StateSpace {
    /// Zeroed state at `status_date` with unit scaling multipliers
    pub fn new(status_date: NaiveDateTime) -> Self {
        Self {
            status_date,
            maturity_date: None,
            notional_principal: 0.0,
            nominal_interest_rate: 0.0,
            accrued_interest: 0.0,
            nominal_interest_rate2: 0.0,
            accrued_interest2: 0.0,
            fee_accrued: 0.0,
            notional_scaling_multiplier: 1.0,
            interest_scaling_multiplier: 1.0,
            interest_calculation_base_amount: 0.0,
            next_principal_redemption_payment: 0.0,
            contract_performance: ContractPerformance::PF,
            exercise_amount: None,
            exercise_date: None,
            boundary: BoundaryState::default(),
        }
    }
}
