//! Typed contract terms
//!
//! `Contract` is a closed sum over the supported kinds. Each variant carries
//! only the blocks its state machine reads, so required attributes are plain
//! fields and optional ones are `Option`s with documented defaults applied at
//! load time.

use chrono::NaiveDateTime;

use super::data::{
    BoundaryDirection, BoundaryEffect, ContractPerformance, ContractRole, ContractType,
    DeliverySettlement, FeeBasis, FixedVariable, IncreaseDecrease, InterestCalculationBase,
    LegRole, OptionExerciseType, OptionType, ScalingEffect,
};
use crate::time::{BusinessDayAdjuster, Cycle, DayCounter, EndOfMonthConvention, Period};

/// Date conventions shared by every event of one contract
#[derive(Debug, Clone, PartialEq)]
pub struct Conventions {
    pub day_counter: DayCounter,
    pub business_day: BusinessDayAdjuster,
    pub end_of_month: EndOfMonthConvention,
}

/// Purchase or termination at a price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Settlement {
    pub date: NaiveDateTime,
    pub price: f64,
}

/// Attributes every contract kind carries
#[derive(Debug, Clone, PartialEq)]
pub struct CommonTerms {
    pub contract_id: String,
    pub contract_type: ContractType,
    pub status_date: NaiveDateTime,
    pub contract_role: ContractRole,
    pub currency: String,
    pub conventions: Conventions,
    pub contract_performance: ContractPerformance,
    pub purchase: Option<Settlement>,
    pub termination: Option<Settlement>,
    /// Behavior model ids producing prepayment callouts
    pub prepayment_models: Vec<String>,
    /// Behavior model ids producing deposit transaction callouts
    pub deposit_models: Vec<String>,
    /// Market object code of the contract itself (price series)
    pub market_object_code: Option<String>,
}

impl CommonTerms {
    pub fn role_sign(&self) -> f64 {
        self.contract_role.sign()
    }

    /// All behavior models the contract needs activated
    pub fn behavior_models(&self) -> impl Iterator<Item = &String> {
        self.prepayment_models.iter().chain(self.deposit_models.iter())
    }
}

/// Anchor plus optional cycle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Recurrence {
    pub anchor: Option<NaiveDateTime>,
    pub cycle: Option<Cycle>,
}

impl Recurrence {
    pub fn new(anchor: Option<NaiveDateTime>, cycle: Option<Cycle>) -> Self {
        Self { anchor, cycle }
    }

    pub fn is_defined(&self) -> bool {
        self.anchor.is_some() || self.cycle.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterestTerms {
    pub nominal_interest_rate: f64,
    /// Accrued interest at the status date; computed when absent
    pub accrued_interest: Option<f64>,
    pub payment: Recurrence,
    /// Interest payments up to this date are capitalized instead of paid
    pub capitalization_end_date: Option<NaiveDateTime>,
}

/// Floating-rate parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RateResetTerms {
    pub recurrence: Recurrence,
    pub market_object_code: Option<String>,
    pub spread: f64,
    pub multiplier: f64,
    /// Already fixed rate for the first reset after the status date
    pub next_reset_rate: Option<f64>,
    /// The reference index is observed this long before the reset
    pub fixing_period: Period,
    pub period_cap: f64,
    pub period_floor: f64,
    pub life_cap: f64,
    pub life_floor: f64,
}

impl Default for RateResetTerms {
    fn default() -> Self {
        Self {
            recurrence: Recurrence::default(),
            market_object_code: None,
            spread: 0.0,
            multiplier: 1.0,
            next_reset_rate: None,
            fixing_period: Period::ZERO,
            period_cap: f64::INFINITY,
            period_floor: f64::NEG_INFINITY,
            life_cap: f64::INFINITY,
            life_floor: f64::NEG_INFINITY,
        }
    }
}

impl RateResetTerms {
    /// Apply period and life caps/floors to a target rate
    pub fn bound(&self, current: f64, target: f64) -> f64 {
        let delta = (target - current).max(self.period_floor).min(self.period_cap);
        (current + delta).max(self.life_floor).min(self.life_cap)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeeTerms {
    pub basis: FeeBasis,
    pub rate: f64,
    pub accrued: f64,
    pub recurrence: Recurrence,
}

/// Index-linked scaling of notional and/or interest
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingTerms {
    pub effect: ScalingEffect,
    pub recurrence: Recurrence,
    pub market_object_code: Option<String>,
    pub index_at_status_date: f64,
    pub notional_multiplier: f64,
    pub interest_multiplier: f64,
}

impl Default for ScalingTerms {
    fn default() -> Self {
        Self {
            effect: ScalingEffect::default(),
            recurrence: Recurrence::default(),
            market_object_code: None,
            index_at_status_date: 1.0,
            notional_multiplier: 1.0,
            interest_multiplier: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InterestBaseTerms {
    pub base: InterestCalculationBase,
    pub amount: Option<f64>,
    pub recurrence: Recurrence,
}

/// Blocks shared by every interest-bearing loan kind
#[derive(Debug, Clone, PartialEq)]
pub struct LoanTerms {
    pub initial_exchange_date: NaiveDateTime,
    pub notional_principal: f64,
    pub premium_discount_at_ied: f64,
    pub interest: InterestTerms,
    pub rate_reset: RateResetTerms,
    pub fee: FeeTerms,
    pub scaling: ScalingTerms,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PamTerms {
    pub common: CommonTerms,
    pub loan: LoanTerms,
    pub maturity_date: NaiveDateTime,
}

/// Terms of the LAM, NAM and ANN kinds
#[derive(Debug, Clone, PartialEq)]
pub struct AmortizerTerms {
    pub common: CommonTerms,
    pub loan: LoanTerms,
    /// Back-solved from the redemption amount when absent
    pub maturity_date: Option<NaiveDateTime>,
    pub principal_redemption: Recurrence,
    /// Redemption (LAM) or installment (NAM/ANN) per cycle
    pub next_principal_redemption_payment: Option<f64>,
    pub interest_base: InterestBaseTerms,
    pub amortization_date: Option<NaiveDateTime>,
}

/// Terms of the CLM and UMP kinds
#[derive(Debug, Clone, PartialEq)]
pub struct CallMoneyTerms {
    pub common: CommonTerms,
    pub loan: LoanTerms,
    /// Open-ended when absent; the query horizon bounds the schedule
    pub maturity_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipalLeg {
    pub anchor: NaiveDateTime,
    pub cycle: Option<Cycle>,
    pub amount: f64,
    pub direction: IncreaseDecrease,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLeg {
    pub anchor: NaiveDateTime,
    pub cycle: Option<Cycle>,
    /// Fixed rate for FIX legs, spread for VAR legs
    pub rate: f64,
    pub kind: FixedVariable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExoticAmortizerTerms {
    pub common: CommonTerms,
    pub loan: LoanTerms,
    pub maturity_date: Option<NaiveDateTime>,
    pub principal_legs: Vec<PrincipalLeg>,
    pub interest_anchors: Vec<NaiveDateTime>,
    pub interest_cycles: Vec<Option<Cycle>>,
    pub rate_legs: Vec<RateLeg>,
    pub interest_base: InterestBaseTerms,
}

/// Plain vanilla swap: fixed leg against a floating leg on one notional
#[derive(Debug, Clone, PartialEq)]
pub struct SwapTerms {
    pub common: CommonTerms,
    pub initial_exchange_date: NaiveDateTime,
    pub maturity_date: NaiveDateTime,
    pub notional_principal: f64,
    /// Fixed leg rate
    pub nominal_interest_rate: f64,
    /// Floating leg rate until the first reset
    pub nominal_interest_rate2: f64,
    pub accrued_interest: Option<f64>,
    pub accrued_interest2: Option<f64>,
    pub payment: Recurrence,
    pub rate_reset: RateResetTerms,
    pub delivery: DeliverySettlement,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionTerms {
    pub common: CommonTerms,
    pub maturity_date: Option<NaiveDateTime>,
    pub exercise_date: Option<NaiveDateTime>,
    pub exercise_amount: Option<f64>,
    pub settlement_period: Period,
    pub option_type: OptionType,
    pub strike1: f64,
    pub strike2: Option<f64>,
    pub exercise_type: OptionExerciseType,
    /// Market object code of the underlying's price
    pub underlying: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockTerms {
    pub common: CommonTerms,
    pub quantity: f64,
    pub dividend: Recurrence,
    pub next_dividend_payment_amount: Option<f64>,
    pub dividend_market_object_code: Option<String>,
}

/// Boundary controlled switch over one or two child legs
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchTerms {
    pub common: CommonTerms,
    pub monitoring: Recurrence,
    pub monitoring_end_date: NaiveDateTime,
    pub boundary_value: f64,
    pub direction: BoundaryDirection,
    pub effect: BoundaryEffect,
    pub leg_initially_active: Option<LegRole>,
    /// Market object code of the monitored index
    pub reference_index: String,
    pub first_leg: Box<Contract>,
    pub second_leg: Option<Box<Contract>>,
}

/// A validated contract, one variant per state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Contract {
    Pam(PamTerms),
    Lam(AmortizerTerms),
    Nam(AmortizerTerms),
    Ann(AmortizerTerms),
    Clm(CallMoneyTerms),
    Ump(CallMoneyTerms),
    Lax(ExoticAmortizerTerms),
    Swppv(SwapTerms),
    Optns(OptionTerms),
    Stk(StockTerms),
    Bcs(SwitchTerms),
}

impl Contract {
    pub fn common(&self) -> &CommonTerms {
        match self {
            Contract::Pam(t) => &t.common,
            Contract::Lam(t) | Contract::Nam(t) | Contract::Ann(t) => &t.common,
            Contract::Clm(t) | Contract::Ump(t) => &t.common,
            Contract::Lax(t) => &t.common,
            Contract::Swppv(t) => &t.common,
            Contract::Optns(t) => &t.common,
            Contract::Stk(t) => &t.common,
            Contract::Bcs(t) => &t.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut CommonTerms {
        match self {
            Contract::Pam(t) => &mut t.common,
            Contract::Lam(t) | Contract::Nam(t) | Contract::Ann(t) => &mut t.common,
            Contract::Clm(t) | Contract::Ump(t) => &mut t.common,
            Contract::Lax(t) => &mut t.common,
            Contract::Swppv(t) => &mut t.common,
            Contract::Optns(t) => &mut t.common,
            Contract::Stk(t) => &mut t.common,
            Contract::Bcs(t) => &mut t.common,
        }
    }

    pub fn contract_id(&self) -> &str {
        &self.common().contract_id
    }

    pub fn contract_type(&self) -> ContractType {
        self.common().contract_type
    }

    /// Loan block of interest-bearing kinds
    pub fn loan(&self) -> Option<&LoanTerms> {
        match self {
            Contract::Pam(t) => Some(&t.loan),
            Contract::Lam(t) | Contract::Nam(t) | Contract::Ann(t) => Some(&t.loan),
            Contract::Clm(t) | Contract::Ump(t) => Some(&t.loan),
            Contract::Lax(t) => Some(&t.loan),
            _ => None,
        }
    }

    pub fn initial_exchange_date(&self) -> Option<NaiveDateTime> {
        match self {
            Contract::Swppv(t) => Some(t.initial_exchange_date),
            _ => self.loan().map(|l| l.initial_exchange_date),
        }
    }

    /// Stated maturity, if the terms carry one
    pub fn maturity_date(&self) -> Option<NaiveDateTime> {
        match self {
            Contract::Pam(t) => Some(t.maturity_date),
            Contract::Lam(t) | Contract::Nam(t) | Contract::Ann(t) => {
                t.amortization_date.or(t.maturity_date)
            }
            Contract::Clm(t) | Contract::Ump(t) => t.maturity_date,
            Contract::Lax(t) => t.maturity_date,
            Contract::Swppv(t) => Some(t.maturity_date),
            Contract::Optns(t) => t.maturity_date,
            Contract::Stk(_) => None,
            Contract::Bcs(t) => Some(t.monitoring_end_date),
        }
    }

    pub fn notional_principal(&self) -> f64 {
        match self {
            Contract::Swppv(t) => t.notional_principal,
            Contract::Stk(t) => t.quantity,
            _ => self.loan().map(|l| l.notional_principal).unwrap_or(0.0),
        }
    }
}
