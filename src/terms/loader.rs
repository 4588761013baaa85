//! Loading ACTUS-style JSON terms into typed contracts
//!
//! `RawTerms` mirrors the loosely typed camelCase attribute map. Conversion to
//! `Contract` enforces the per-kind mandatory attributes, applies the
//! documented defaults and resolves contract-structure references.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::error::Error;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use super::contract::*;
use super::data::*;
use crate::error::ActusError;
use crate::time::{
    BusinessDayAdjuster, BusinessDayConvention, Calendar, Cycle, DayCountConvention, DayCounter,
    EndOfMonthConvention, Period,
};

/// Maximum depth of nested contract structures
pub const MAX_STRUCTURE_DEPTH: usize = 4;

/// Parse `YYYY-MM-DD` or `YYYY-MM-DDTHH:MM[:SS]`
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M"))
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// A number given either as a JSON number or as a numeric string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Lenient {
    Number(f64),
    Text(String),
}

impl Lenient {
    fn as_f64(&self) -> Option<f64> {
        match self {
            Lenient::Number(n) => Some(*n),
            Lenient::Text(s) => s.trim().parse().ok(),
        }
    }

    fn as_text(&self) -> String {
        match self {
            Lenient::Number(n) => n.to_string(),
            Lenient::Text(s) => s.trim().to_string(),
        }
    }
}

/// Array attribute, given as a JSON array or as a bracketed string
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ListValue {
    Items(Vec<Lenient>),
    Text(String),
}

impl ListValue {
    fn items(&self) -> Vec<String> {
        match self {
            ListValue::Items(items) => items.iter().map(Lenient::as_text).collect(),
            ListValue::Text(text) => text
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

/// One entry of `contractStructure`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawReference {
    pub reference_role: String,
    #[serde(default)]
    pub reference_type: Option<String>,
    pub object: serde_json::Value,
}

/// Looks up contracts referenced by id from a contract structure
pub trait ContractResolver {
    fn resolve(&self, contract_id: &str) -> Option<RawTerms>;
}

/// Resolver for standalone contracts with no id references
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferences;

impl ContractResolver for NoReferences {
    fn resolve(&self, _contract_id: &str) -> Option<RawTerms> {
        None
    }
}

impl ContractResolver for HashMap<String, RawTerms> {
    fn resolve(&self, contract_id: &str) -> Option<RawTerms> {
        self.get(contract_id).cloned()
    }
}

/// Attribute map as it arrives from JSON
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawTerms {
    pub contract_type: Option<String>,
    #[serde(alias = "contractID")]
    pub contract_id: Option<String>,
    pub status_date: Option<String>,
    pub contract_role: Option<String>,
    pub currency: Option<String>,
    pub day_count_convention: Option<String>,
    pub business_day_convention: Option<String>,
    pub calendar: Option<String>,
    pub holidays: Vec<String>,
    pub end_of_month_convention: Option<String>,
    pub contract_performance: Option<String>,
    pub market_object_code: Option<String>,

    pub purchase_date: Option<String>,
    pub price_at_purchase_date: Option<Lenient>,
    pub termination_date: Option<String>,
    pub price_at_termination_date: Option<Lenient>,

    pub prepayment_models: Vec<String>,
    pub deposit_trx_models: Vec<String>,

    pub initial_exchange_date: Option<String>,
    pub maturity_date: Option<String>,
    pub notional_principal: Option<Lenient>,
    #[serde(alias = "premiumDiscountAtIED")]
    pub premium_discount_at_ied: Option<Lenient>,

    pub nominal_interest_rate: Option<Lenient>,
    pub nominal_interest_rate2: Option<Lenient>,
    pub accrued_interest: Option<Lenient>,
    pub accrued_interest2: Option<Lenient>,
    pub cycle_anchor_date_of_interest_payment: Option<String>,
    pub cycle_of_interest_payment: Option<String>,
    pub capitalization_end_date: Option<String>,

    pub cycle_anchor_date_of_rate_reset: Option<String>,
    pub cycle_of_rate_reset: Option<String>,
    pub market_object_code_of_rate_reset: Option<String>,
    pub rate_spread: Option<Lenient>,
    pub rate_multiplier: Option<Lenient>,
    pub next_reset_rate: Option<Lenient>,
    pub fixing_period: Option<String>,
    pub period_cap: Option<Lenient>,
    pub period_floor: Option<Lenient>,
    pub life_cap: Option<Lenient>,
    pub life_floor: Option<Lenient>,

    pub fee_basis: Option<String>,
    pub fee_rate: Option<Lenient>,
    pub fee_accrued: Option<Lenient>,
    pub cycle_anchor_date_of_fee: Option<String>,
    pub cycle_of_fee: Option<String>,

    pub scaling_effect: Option<String>,
    pub cycle_anchor_date_of_scaling_index: Option<String>,
    pub cycle_of_scaling_index: Option<String>,
    pub market_object_code_of_scaling_index: Option<String>,
    pub scaling_index_at_status_date: Option<Lenient>,
    pub notional_scaling_multiplier: Option<Lenient>,
    pub interest_scaling_multiplier: Option<Lenient>,

    pub interest_calculation_base: Option<String>,
    pub interest_calculation_base_amount: Option<Lenient>,
    pub cycle_anchor_date_of_interest_calculation_base: Option<String>,
    pub cycle_of_interest_calculation_base: Option<String>,

    pub cycle_anchor_date_of_principal_redemption: Option<String>,
    pub cycle_of_principal_redemption: Option<String>,
    pub next_principal_redemption_payment: Option<Lenient>,
    pub amortization_date: Option<String>,

    pub array_cycle_anchor_date_of_principal_redemption: Option<ListValue>,
    pub array_cycle_of_principal_redemption: Option<ListValue>,
    pub array_next_principal_redemption_payment: Option<ListValue>,
    pub array_increase_decrease: Option<ListValue>,
    pub array_cycle_anchor_date_of_interest_payment: Option<ListValue>,
    pub array_cycle_of_interest_payment: Option<ListValue>,
    pub array_cycle_anchor_date_of_rate_reset: Option<ListValue>,
    pub array_cycle_of_rate_reset: Option<ListValue>,
    pub array_rate: Option<ListValue>,
    pub array_fixed_variable: Option<ListValue>,

    pub delivery_settlement: Option<String>,

    pub exercise_date: Option<String>,
    pub exercise_amount: Option<Lenient>,
    pub settlement_period: Option<String>,
    pub option_type: Option<String>,
    pub option_strike1: Option<Lenient>,
    #[serde(alias = "OptionStrike2")]
    pub option_strike2: Option<Lenient>,
    pub option_exercise_type: Option<String>,

    pub quantity: Option<Lenient>,
    pub cycle_anchor_date_of_dividend_payment: Option<String>,
    pub cycle_of_dividend_payment: Option<String>,
    pub next_dividend_payment_amount: Option<Lenient>,
    pub market_object_code_of_dividends: Option<String>,

    pub boundary_value: Option<Lenient>,
    pub boundary_direction: Option<String>,
    pub boundary_effect: Option<String>,
    pub boundary_leg_initially_active: Option<String>,
    pub boundary_monitoring_anchor_date: Option<String>,
    pub boundary_monitoring_cycle: Option<String>,
    pub boundary_monitoring_end_date: Option<String>,

    pub contract_structure: Vec<RawReference>,
}

/// Resolved contract-structure entry
enum Reference {
    Contract(Box<RawTerms>),
    MarketObject(String),
}

/// Field parsing bound to one contract id for error context
struct Fields<'a> {
    id: &'a str,
}

impl Fields<'_> {
    fn date(&self, field: &str, value: &Option<String>) -> Result<Option<NaiveDateTime>, ActusError> {
        value
            .as_deref()
            .map(|text| {
                parse_datetime(text)
                    .ok_or_else(|| ActusError::attribute(self.id, field, format!("is not a date: `{text}`")))
            })
            .transpose()
    }

    fn required_date(&self, field: &str, value: &Option<String>) -> Result<NaiveDateTime, ActusError> {
        self.date(field, value)?.ok_or_else(|| ActusError::missing(self.id, field))
    }

    fn number(&self, field: &str, value: &Option<Lenient>) -> Result<Option<f64>, ActusError> {
        value
            .as_ref()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| ActusError::attribute(self.id, field, format!("is not a number: `{}`", v.as_text())))
            })
            .transpose()
    }

    fn required_number(&self, field: &str, value: &Option<Lenient>) -> Result<f64, ActusError> {
        self.number(field, value)?.ok_or_else(|| ActusError::missing(self.id, field))
    }

    fn cycle(&self, field: &str, value: &Option<String>) -> Result<Option<Cycle>, ActusError> {
        value
            .as_deref()
            .map(|text| self.parse_cycle(field, text))
            .transpose()
    }

    fn parse_cycle(&self, field: &str, text: &str) -> Result<Cycle, ActusError> {
        let cycle: Cycle = text
            .parse()
            .map_err(|e: crate::error::ScheduleError| ActusError::attribute(self.id, field, e.to_string()))?;
        cycle
            .validate()
            .map_err(|e| ActusError::attribute(self.id, field, e.to_string()))?;
        Ok(cycle)
    }

    /// A lag such as a fixing or settlement period. `P0D` means no lag.
    fn period(&self, field: &str, value: &Option<String>) -> Result<Option<Period>, ActusError> {
        value
            .as_deref()
            .map(|text| {
                let period = text
                    .parse::<Period>()
                    .map_err(|e| ActusError::attribute(self.id, field, e.to_string()))?;
                if period.count < 0 {
                    return Err(ActusError::attribute(self.id, field, format!("must not be negative: `{text}`")));
                }
                Ok(period)
            })
            .transpose()
    }

    fn tag<T: FromStr<Err = String>>(&self, field: &str, value: &Option<String>) -> Result<Option<T>, ActusError> {
        value
            .as_deref()
            .map(|text| text.parse::<T>().map_err(|e| ActusError::attribute(self.id, field, e)))
            .transpose()
    }

    fn required_tag<T: FromStr<Err = String>>(&self, field: &str, value: &Option<String>) -> Result<T, ActusError> {
        self.tag(field, value)?.ok_or_else(|| ActusError::missing(self.id, field))
    }

    fn required_text(&self, field: &str, value: &Option<String>) -> Result<String, ActusError> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ActusError::missing(self.id, field))
    }

    fn list(&self, value: &Option<ListValue>) -> Vec<String> {
        value.as_ref().map(ListValue::items).unwrap_or_default()
    }

    fn date_list(&self, field: &str, value: &Option<ListValue>) -> Result<Vec<NaiveDateTime>, ActusError> {
        self.list(value)
            .iter()
            .map(|text| {
                parse_datetime(text)
                    .ok_or_else(|| ActusError::attribute(self.id, field, format!("is not a date: `{text}`")))
            })
            .collect()
    }

    fn number_list(&self, field: &str, value: &Option<ListValue>) -> Result<Vec<f64>, ActusError> {
        self.list(value)
            .iter()
            .map(|text| {
                text.parse::<f64>()
                    .map_err(|_| ActusError::attribute(self.id, field, format!("is not a number: `{text}`")))
            })
            .collect()
    }

    /// Cycles aligned with `len` anchors; an absent array means no cycles
    fn cycle_list(&self, field: &str, value: &Option<ListValue>, len: usize) -> Result<Vec<Option<Cycle>>, ActusError> {
        let items = self.list(value);
        if items.is_empty() {
            return Ok(vec![None; len]);
        }
        if items.len() != len {
            return Err(ActusError::attribute(
                self.id,
                field,
                format!("has {} entries but {} anchors are given", items.len(), len),
            ));
        }
        items.iter().map(|text| self.parse_cycle(field, text).map(Some)).collect()
    }

    fn tag_list<T: FromStr<Err = String>>(&self, field: &str, value: &Option<ListValue>) -> Result<Vec<T>, ActusError> {
        self.list(value)
            .iter()
            .map(|text| text.parse::<T>().map_err(|e| ActusError::attribute(self.id, field, e)))
            .collect()
    }

    /// Anchor as given, else `fallback + cycle` when a cycle is given
    fn recurrence(
        &self,
        anchor_field: &str,
        anchor: &Option<String>,
        cycle_field: &str,
        cycle: &Option<String>,
        fallback: Option<NaiveDateTime>,
    ) -> Result<Recurrence, ActusError> {
        let cycle = self.cycle(cycle_field, cycle)?;
        let anchor = match self.date(anchor_field, anchor)? {
            Some(a) => Some(a),
            None => match (cycle, fallback) {
                (Some(c), Some(base)) => Some(
                    c.period
                        .add_to(base)
                        .map_err(|e| ActusError::schedule(self.id, e))?,
                ),
                _ => None,
            },
        };
        Ok(Recurrence::new(anchor, cycle))
    }
}

impl RawTerms {
    /// Convert a standalone contract
    pub fn to_contract(&self) -> Result<Contract, ActusError> {
        self.to_contract_with(&NoReferences)
    }

    /// Convert, resolving contract-id references through `resolver`
    pub fn to_contract_with(&self, resolver: &dyn ContractResolver) -> Result<Contract, ActusError> {
        self.build(resolver, &[], None)
    }

    fn build(
        &self,
        resolver: &dyn ContractResolver,
        ancestors: &[String],
        parent_status_date: Option<NaiveDateTime>,
    ) -> Result<Contract, ActusError> {
        let id = self.contract_id.clone().unwrap_or_else(|| "<unnamed>".to_string());
        let contract_type: ContractType = self
            .contract_type
            .as_deref()
            .ok_or_else(|| ActusError::missing(&id, "contractType"))?
            .parse()?;
        if self.contract_id.is_none() {
            return Err(ActusError::missing(&id, "contractID"));
        }
        if ancestors.contains(&id) {
            let mut chain = ancestors.to_vec();
            chain.push(id.clone());
            return Err(ActusError::ContractCycle {
                contract_id: id,
                chain: chain.join(" -> "),
            });
        }
        if ancestors.len() >= MAX_STRUCTURE_DEPTH {
            return Err(ActusError::attribute(
                &id,
                "contractStructure",
                format!("nests deeper than {MAX_STRUCTURE_DEPTH} levels"),
            ));
        }

        let f = Fields { id: &id };
        let common = self.common(&f, contract_type, parent_status_date)?;
        log::trace!("converting {} contract {}", contract_type, id);

        let contract = match contract_type {
            ContractType::PAM => Contract::Pam(PamTerms {
                loan: self.loan(&f)?,
                maturity_date: f.required_date("maturityDate", &self.maturity_date)?,
                common,
            }),
            ContractType::LAM => Contract::Lam(self.amortizer(&f, common)?),
            ContractType::NAM => Contract::Nam(self.amortizer(&f, common)?),
            ContractType::ANN => Contract::Ann(self.amortizer(&f, common)?),
            ContractType::CLM => Contract::Clm(CallMoneyTerms {
                loan: self.loan(&f)?,
                maturity_date: f.date("maturityDate", &self.maturity_date)?,
                common,
            }),
            ContractType::UMP => Contract::Ump(CallMoneyTerms {
                loan: self.loan(&f)?,
                maturity_date: None,
                common,
            }),
            ContractType::LAX => Contract::Lax(self.exotic(&f, common)?),
            ContractType::SWPPV => Contract::Swppv(self.swap(&f, common)?),
            ContractType::OPTNS => Contract::Optns(self.option(&f, common, resolver, ancestors)?),
            ContractType::STK => Contract::Stk(self.stock(&f, common)?),
            ContractType::BCS => Contract::Bcs(self.switch(&f, common, resolver, ancestors)?),
        };
        Ok(contract)
    }

    fn common(
        &self,
        f: &Fields<'_>,
        contract_type: ContractType,
        parent_status_date: Option<NaiveDateTime>,
    ) -> Result<CommonTerms, ActusError> {
        let status_date = match f.date("statusDate", &self.status_date)? {
            Some(d) => d,
            None => parent_status_date.ok_or_else(|| ActusError::missing(f.id, "statusDate"))?,
        };

        let holidays: BTreeSet<NaiveDate> = self
            .holidays
            .iter()
            .map(|h| {
                parse_datetime(h)
                    .map(|d| d.date())
                    .ok_or_else(|| ActusError::attribute(f.id, "holidays", format!("is not a date: `{h}`")))
            })
            .collect::<Result<_, _>>()?;
        let calendar = match self.calendar.as_deref() {
            Some(tag) => Calendar::from_tag(tag, holidays)
                .ok_or_else(|| ActusError::attribute(f.id, "calendar", format!("unknown calendar `{tag}`")))?,
            None => Calendar::default(),
        };

        let day_count: DayCountConvention = f.required_tag("dayCountConvention", &self.day_count_convention)?;
        let maturity = f.date("maturityDate", &self.maturity_date)?;
        let business_day: BusinessDayConvention =
            f.tag("businessDayConvention", &self.business_day_convention)?.unwrap_or_default();

        let purchase = f
            .date("purchaseDate", &self.purchase_date)?
            .map(|date| -> Result<Settlement, ActusError> {
                Ok(Settlement {
                    date,
                    price: f.number("priceAtPurchaseDate", &self.price_at_purchase_date)?.unwrap_or(0.0),
                })
            })
            .transpose()?;
        let termination = f
            .date("terminationDate", &self.termination_date)?
            .map(|date| -> Result<Settlement, ActusError> {
                Ok(Settlement {
                    date,
                    price: f.number("priceAtTerminationDate", &self.price_at_termination_date)?.unwrap_or(0.0),
                })
            })
            .transpose()?;

        Ok(CommonTerms {
            contract_id: f.id.to_string(),
            contract_type,
            status_date,
            contract_role: f.required_tag("contractRole", &self.contract_role)?,
            currency: f.required_text("currency", &self.currency)?,
            conventions: Conventions {
                day_counter: DayCounter::new(day_count)
                    .with_maturity(maturity)
                    .with_calendar(calendar.clone()),
                business_day: BusinessDayAdjuster::new(business_day, calendar),
                end_of_month: f
                    .tag::<EndOfMonthConvention>("endOfMonthConvention", &self.end_of_month_convention)?
                    .unwrap_or_default(),
            },
            contract_performance: f.tag("contractPerformance", &self.contract_performance)?.unwrap_or_default(),
            purchase,
            termination,
            prepayment_models: self.prepayment_models.clone(),
            deposit_models: self.deposit_trx_models.clone(),
            market_object_code: self.market_object_code.clone(),
        })
    }

    fn rate_reset(&self, f: &Fields<'_>, ied: Option<NaiveDateTime>) -> Result<RateResetTerms, ActusError> {
        let defaults = RateResetTerms::default();
        Ok(RateResetTerms {
            recurrence: f.recurrence(
                "cycleAnchorDateOfRateReset",
                &self.cycle_anchor_date_of_rate_reset,
                "cycleOfRateReset",
                &self.cycle_of_rate_reset,
                ied,
            )?,
            market_object_code: self.market_object_code_of_rate_reset.clone(),
            spread: f.number("rateSpread", &self.rate_spread)?.unwrap_or(defaults.spread),
            multiplier: f.number("rateMultiplier", &self.rate_multiplier)?.unwrap_or(defaults.multiplier),
            next_reset_rate: f.number("nextResetRate", &self.next_reset_rate)?,
            fixing_period: f.period("fixingPeriod", &self.fixing_period)?.unwrap_or(defaults.fixing_period),
            period_cap: f.number("periodCap", &self.period_cap)?.unwrap_or(defaults.period_cap),
            period_floor: f.number("periodFloor", &self.period_floor)?.unwrap_or(defaults.period_floor),
            life_cap: f.number("lifeCap", &self.life_cap)?.unwrap_or(defaults.life_cap),
            life_floor: f.number("lifeFloor", &self.life_floor)?.unwrap_or(defaults.life_floor),
        })
    }

    fn loan(&self, f: &Fields<'_>) -> Result<LoanTerms, ActusError> {
        let ied = f.required_date("initialExchangeDate", &self.initial_exchange_date)?;
        let scaling_defaults = ScalingTerms::default();

        let rate_reset = self.rate_reset(f, Some(ied))?;
        if rate_reset.recurrence.is_defined() && rate_reset.market_object_code.is_none() {
            return Err(ActusError::missing(f.id, "marketObjectCodeOfRateReset"));
        }

        let scaling = ScalingTerms {
            effect: f.tag("scalingEffect", &self.scaling_effect)?.unwrap_or_default(),
            recurrence: f.recurrence(
                "cycleAnchorDateOfScalingIndex",
                &self.cycle_anchor_date_of_scaling_index,
                "cycleOfScalingIndex",
                &self.cycle_of_scaling_index,
                Some(ied),
            )?,
            market_object_code: self.market_object_code_of_scaling_index.clone(),
            index_at_status_date: f
                .number("scalingIndexAtStatusDate", &self.scaling_index_at_status_date)?
                .unwrap_or(scaling_defaults.index_at_status_date),
            notional_multiplier: f
                .number("notionalScalingMultiplier", &self.notional_scaling_multiplier)?
                .unwrap_or(scaling_defaults.notional_multiplier),
            interest_multiplier: f
                .number("interestScalingMultiplier", &self.interest_scaling_multiplier)?
                .unwrap_or(scaling_defaults.interest_multiplier),
        };
        if scaling.effect.is_active() && scaling.market_object_code.is_none() {
            return Err(ActusError::missing(f.id, "marketObjectCodeOfScalingIndex"));
        }

        Ok(LoanTerms {
            initial_exchange_date: ied,
            notional_principal: f.required_number("notionalPrincipal", &self.notional_principal)?,
            premium_discount_at_ied: f.number("premiumDiscountAtIED", &self.premium_discount_at_ied)?.unwrap_or(0.0),
            interest: InterestTerms {
                nominal_interest_rate: f.required_number("nominalInterestRate", &self.nominal_interest_rate)?,
                accrued_interest: f.number("accruedInterest", &self.accrued_interest)?,
                payment: f.recurrence(
                    "cycleAnchorDateOfInterestPayment",
                    &self.cycle_anchor_date_of_interest_payment,
                    "cycleOfInterestPayment",
                    &self.cycle_of_interest_payment,
                    Some(ied),
                )?,
                capitalization_end_date: f.date("capitalizationEndDate", &self.capitalization_end_date)?,
            },
            rate_reset,
            fee: FeeTerms {
                basis: f.tag("feeBasis", &self.fee_basis)?.unwrap_or_default(),
                rate: f.number("feeRate", &self.fee_rate)?.unwrap_or(0.0),
                accrued: f.number("feeAccrued", &self.fee_accrued)?.unwrap_or(0.0),
                recurrence: f.recurrence(
                    "cycleAnchorDateOfFee",
                    &self.cycle_anchor_date_of_fee,
                    "cycleOfFee",
                    &self.cycle_of_fee,
                    Some(ied),
                )?,
            },
            scaling,
        })
    }

    fn interest_base(&self, f: &Fields<'_>, ied: NaiveDateTime) -> Result<InterestBaseTerms, ActusError> {
        let base: InterestCalculationBase =
            f.tag("interestCalculationBase", &self.interest_calculation_base)?.unwrap_or_default();
        let recurrence = f.recurrence(
            "cycleAnchorDateOfInterestCalculationBase",
            &self.cycle_anchor_date_of_interest_calculation_base,
            "cycleOfInterestCalculationBase",
            &self.cycle_of_interest_calculation_base,
            Some(ied),
        )?;
        if base == InterestCalculationBase::NTL && recurrence.anchor.is_none() {
            return Err(ActusError::missing(f.id, "cycleAnchorDateOfInterestCalculationBase"));
        }
        Ok(InterestBaseTerms {
            base,
            amount: f.number("interestCalculationBaseAmount", &self.interest_calculation_base_amount)?,
            recurrence,
        })
    }

    fn amortizer(&self, f: &Fields<'_>, common: CommonTerms) -> Result<AmortizerTerms, ActusError> {
        let loan = self.loan(f)?;
        let ied = loan.initial_exchange_date;
        let principal_redemption = f.recurrence(
            "cycleAnchorDateOfPrincipalRedemption",
            &self.cycle_anchor_date_of_principal_redemption,
            "cycleOfPrincipalRedemption",
            &self.cycle_of_principal_redemption,
            Some(ied),
        )?;
        if principal_redemption.cycle.is_none() {
            return Err(ActusError::missing(f.id, "cycleOfPrincipalRedemption"));
        }

        let maturity_date = f.date("maturityDate", &self.maturity_date)?;
        let next_principal_redemption_payment =
            f.number("nextPrincipalRedemptionPayment", &self.next_principal_redemption_payment)?;
        let amortization_date = f.date("amortizationDate", &self.amortization_date)?;

        let needs_payment = common.contract_type == ContractType::NAM;
        if needs_payment && next_principal_redemption_payment.is_none() {
            return Err(ActusError::missing(f.id, "nextPrincipalRedemptionPayment"));
        }
        if maturity_date.is_none() && amortization_date.is_none() && next_principal_redemption_payment.is_none() {
            return Err(ActusError::attribute(
                f.id,
                "maturityDate",
                "is required when nextPrincipalRedemptionPayment is missing",
            ));
        }

        Ok(AmortizerTerms {
            interest_base: self.interest_base(f, ied)?,
            common,
            loan,
            maturity_date,
            principal_redemption,
            next_principal_redemption_payment,
            amortization_date,
        })
    }

    fn exotic(&self, f: &Fields<'_>, common: CommonTerms) -> Result<ExoticAmortizerTerms, ActusError> {
        let loan = self.loan(f)?;
        let ied = loan.initial_exchange_date;

        let pr_anchors = f.date_list(
            "arrayCycleAnchorDateOfPrincipalRedemption",
            &self.array_cycle_anchor_date_of_principal_redemption,
        )?;
        let pr_cycles = f.cycle_list(
            "arrayCycleOfPrincipalRedemption",
            &self.array_cycle_of_principal_redemption,
            pr_anchors.len(),
        )?;
        let pr_amounts = f.number_list(
            "arrayNextPrincipalRedemptionPayment",
            &self.array_next_principal_redemption_payment,
        )?;
        let pr_directions: Vec<IncreaseDecrease> =
            f.tag_list("arrayIncreaseDecrease", &self.array_increase_decrease)?;
        if pr_amounts.len() != pr_anchors.len() || pr_directions.len() != pr_anchors.len() {
            return Err(ActusError::attribute(
                f.id,
                "arrayNextPrincipalRedemptionPayment",
                "must have one amount and one increase/decrease flag per anchor",
            ));
        }
        let principal_legs = pr_anchors
            .iter()
            .zip(pr_cycles)
            .zip(pr_amounts.iter().zip(pr_directions))
            .map(|((anchor, cycle), (amount, direction))| PrincipalLeg {
                anchor: *anchor,
                cycle,
                amount: *amount,
                direction,
            })
            .collect();

        let interest_anchors = f.date_list(
            "arrayCycleAnchorDateOfInterestPayment",
            &self.array_cycle_anchor_date_of_interest_payment,
        )?;
        let interest_cycles = f.cycle_list(
            "arrayCycleOfInterestPayment",
            &self.array_cycle_of_interest_payment,
            interest_anchors.len(),
        )?;

        let rr_anchors = f.date_list("arrayCycleAnchorDateOfRateReset", &self.array_cycle_anchor_date_of_rate_reset)?;
        let rr_cycles = f.cycle_list("arrayCycleOfRateReset", &self.array_cycle_of_rate_reset, rr_anchors.len())?;
        let rr_rates = f.number_list("arrayRate", &self.array_rate)?;
        let rr_kinds: Vec<FixedVariable> = f.tag_list("arrayFixedVariable", &self.array_fixed_variable)?;
        if rr_rates.len() != rr_anchors.len() || rr_kinds.len() != rr_anchors.len() {
            return Err(ActusError::attribute(
                f.id,
                "arrayRate",
                "must have one rate and one fixed/variable flag per anchor",
            ));
        }
        if rr_kinds.contains(&FixedVariable::VAR) && loan.rate_reset.market_object_code.is_none() {
            return Err(ActusError::missing(f.id, "marketObjectCodeOfRateReset"));
        }
        let rate_legs = rr_anchors
            .iter()
            .zip(rr_cycles)
            .zip(rr_rates.iter().zip(rr_kinds))
            .map(|((anchor, cycle), (rate, kind))| RateLeg {
                anchor: *anchor,
                cycle,
                rate: *rate,
                kind,
            })
            .collect();

        Ok(ExoticAmortizerTerms {
            interest_base: self.interest_base(f, ied)?,
            maturity_date: f.date("maturityDate", &self.maturity_date)?,
            common,
            loan,
            principal_legs,
            interest_anchors,
            interest_cycles,
            rate_legs,
        })
    }

    fn swap(&self, f: &Fields<'_>, common: CommonTerms) -> Result<SwapTerms, ActusError> {
        let ied = f.required_date("initialExchangeDate", &self.initial_exchange_date)?;
        let payment = f.recurrence(
            "cycleAnchorDateOfInterestPayment",
            &self.cycle_anchor_date_of_interest_payment,
            "cycleOfInterestPayment",
            &self.cycle_of_interest_payment,
            Some(ied),
        )?;
        if payment.cycle.is_none() {
            return Err(ActusError::missing(f.id, "cycleOfInterestPayment"));
        }
        let rate_reset = self.rate_reset(f, Some(ied))?;
        if rate_reset.market_object_code.is_none() {
            return Err(ActusError::missing(f.id, "marketObjectCodeOfRateReset"));
        }
        if rate_reset.recurrence.cycle.is_none() {
            return Err(ActusError::missing(f.id, "cycleOfRateReset"));
        }
        Ok(SwapTerms {
            common,
            initial_exchange_date: ied,
            maturity_date: f.required_date("maturityDate", &self.maturity_date)?,
            notional_principal: f.required_number("notionalPrincipal", &self.notional_principal)?,
            nominal_interest_rate: f.required_number("nominalInterestRate", &self.nominal_interest_rate)?,
            nominal_interest_rate2: f.required_number("nominalInterestRate2", &self.nominal_interest_rate2)?,
            accrued_interest: f.number("accruedInterest", &self.accrued_interest)?,
            accrued_interest2: f.number("accruedInterest2", &self.accrued_interest2)?,
            payment,
            rate_reset,
            delivery: f.tag("deliverySettlement", &self.delivery_settlement)?.unwrap_or_default(),
        })
    }

    fn option(
        &self,
        f: &Fields<'_>,
        common: CommonTerms,
        resolver: &dyn ContractResolver,
        ancestors: &[String],
    ) -> Result<OptionTerms, ActusError> {
        let underlying = match self.reference(f, "UDL", resolver)? {
            Some(Reference::MarketObject(code)) => code,
            Some(Reference::Contract(terms)) => {
                let child = terms.build(resolver, &extend(ancestors, f.id), Some(common.status_date))?;
                child
                    .common()
                    .market_object_code
                    .clone()
                    .ok_or_else(|| ActusError::missing(child.contract_id(), "marketObjectCode"))?
            }
            None => self
                .market_object_code
                .clone()
                .ok_or_else(|| ActusError::missing(f.id, "contractStructure"))?,
        };

        let maturity_date = f.date("maturityDate", &self.maturity_date)?;
        let exercise_date = f.date("exerciseDate", &self.exercise_date)?;
        if maturity_date.is_none() && exercise_date.is_none() {
            return Err(ActusError::missing(f.id, "maturityDate"));
        }
        let option_type: OptionType = f.required_tag("optionType", &self.option_type)?;
        let strike2 = f.number("optionStrike2", &self.option_strike2)?;
        if option_type == OptionType::CP && strike2.is_none() {
            return Err(ActusError::missing(f.id, "optionStrike2"));
        }

        Ok(OptionTerms {
            common,
            maturity_date,
            exercise_date,
            exercise_amount: f.number("exerciseAmount", &self.exercise_amount)?,
            settlement_period: f.period("settlementPeriod", &self.settlement_period)?.unwrap_or(Period::ZERO),
            option_type,
            strike1: f.required_number("optionStrike1", &self.option_strike1)?,
            strike2,
            exercise_type: f.tag("optionExerciseType", &self.option_exercise_type)?.unwrap_or_default(),
            underlying,
        })
    }

    fn stock(&self, f: &Fields<'_>, common: CommonTerms) -> Result<StockTerms, ActusError> {
        let dividend = Recurrence::new(
            f.date("cycleAnchorDateOfDividendPayment", &self.cycle_anchor_date_of_dividend_payment)?,
            f.cycle("cycleOfDividendPayment", &self.cycle_of_dividend_payment)?,
        );
        if dividend.cycle.is_some() && dividend.anchor.is_none() {
            return Err(ActusError::missing(f.id, "cycleAnchorDateOfDividendPayment"));
        }
        let next_dividend_payment_amount =
            f.number("nextDividendPaymentAmount", &self.next_dividend_payment_amount)?;
        if dividend.anchor.is_some()
            && next_dividend_payment_amount.is_none()
            && self.market_object_code_of_dividends.is_none()
        {
            return Err(ActusError::missing(f.id, "nextDividendPaymentAmount"));
        }
        Ok(StockTerms {
            common,
            quantity: f.number("quantity", &self.quantity)?.unwrap_or(1.0),
            dividend,
            next_dividend_payment_amount,
            dividend_market_object_code: self.market_object_code_of_dividends.clone(),
        })
    }

    fn switch(
        &self,
        f: &Fields<'_>,
        common: CommonTerms,
        resolver: &dyn ContractResolver,
        ancestors: &[String],
    ) -> Result<SwitchTerms, ActusError> {
        let lineage = extend(ancestors, f.id);
        let leg = |role: &str| -> Result<Option<Box<Contract>>, ActusError> {
            match self.reference(f, role, resolver)? {
                Some(Reference::Contract(terms)) => Ok(Some(Box::new(terms.build(
                    resolver,
                    &lineage,
                    Some(common.status_date),
                )?))),
                Some(Reference::MarketObject(_)) => Err(ActusError::attribute(
                    f.id,
                    "contractStructure",
                    format!("leg `{role}` must reference a contract"),
                )),
                None => Ok(None),
            }
        };
        let first_leg = leg("FIL")?.ok_or_else(|| ActusError::missing(f.id, "contractStructure"))?;
        let second_leg = leg("SEL")?;

        let reference_index = match self
            .reference(f, "EXTERNALREFERENCEINDEX", resolver)?
            .or(self.reference(f, "UDL", resolver)?)
        {
            Some(Reference::MarketObject(code)) => code,
            _ => return Err(ActusError::missing(f.id, "contractStructure")),
        };

        let monitoring_end_date = f.required_date("boundaryMonitoringEndDate", &self.boundary_monitoring_end_date)?;
        let monitoring = Recurrence::new(
            Some(f.required_date("boundaryMonitoringAnchorDate", &self.boundary_monitoring_anchor_date)?),
            f.cycle("boundaryMonitoringCycle", &self.boundary_monitoring_cycle)?,
        );
        let leg_initially_active: Option<LegRole> =
            f.tag("boundaryLegInitiallyActive", &self.boundary_leg_initially_active)?;
        if leg_initially_active == Some(LegRole::SEL) && second_leg.is_none() {
            return Err(ActusError::attribute(
                f.id,
                "boundaryLegInitiallyActive",
                "names the second leg but no second leg is given",
            ));
        }

        Ok(SwitchTerms {
            common,
            monitoring,
            monitoring_end_date,
            boundary_value: f.required_number("boundaryValue", &self.boundary_value)?,
            direction: f.required_tag("boundaryDirection", &self.boundary_direction)?,
            effect: f.required_tag("boundaryEffect", &self.boundary_effect)?,
            leg_initially_active,
            reference_index,
            first_leg,
            second_leg,
        })
    }

    /// First structure entry with `role`, resolved
    fn reference(
        &self,
        f: &Fields<'_>,
        role: &str,
        resolver: &dyn ContractResolver,
    ) -> Result<Option<Reference>, ActusError> {
        let normalize = |s: &str| s.trim().to_ascii_uppercase().replace('_', "");
        let Some(entry) = self
            .contract_structure
            .iter()
            .find(|r| normalize(&r.reference_role) == normalize(role))
        else {
            return Ok(None);
        };
        let kind = entry.reference_type.as_deref().map(normalize);

        let resolve_id = |cid: &str| -> Result<Option<Reference>, ActusError> {
            resolver
                .resolve(cid)
                .map(|terms| Some(Reference::Contract(Box::new(terms))))
                .ok_or_else(|| {
                    ActusError::attribute(f.id, "contractStructure", format!("referenced contract `{cid}` is unknown"))
                })
        };

        match (&entry.object, kind.as_deref()) {
            (serde_json::Value::String(text), Some("CID")) => resolve_id(text),
            (serde_json::Value::String(text), _) => Ok(Some(Reference::MarketObject(text.clone()))),
            (serde_json::Value::Object(map), _) if map.contains_key("contractType") => {
                let terms: RawTerms = serde_json::from_value(entry.object.clone())
                    .map_err(|e| ActusError::attribute(f.id, "contractStructure", e.to_string()))?;
                Ok(Some(Reference::Contract(Box::new(terms))))
            }
            (serde_json::Value::Object(map), _) => {
                if let Some(serde_json::Value::String(cid)) = map.get("contractIdentifier") {
                    resolve_id(cid)
                } else if let Some(serde_json::Value::String(code)) = map.get("marketObjectCode") {
                    Ok(Some(Reference::MarketObject(code.clone())))
                } else {
                    Err(ActusError::attribute(
                        f.id,
                        "contractStructure",
                        format!("reference `{}` has no usable object", entry.reference_role),
                    ))
                }
            }
            _ => Err(ActusError::attribute(
                f.id,
                "contractStructure",
                format!("reference `{}` has no usable object", entry.reference_role),
            )),
        }
    }
}

fn extend(ancestors: &[String], id: &str) -> Vec<String> {
    let mut lineage = ancestors.to_vec();
    lineage.push(id.to_string());
    lineage
}

/// Parse one terms object or an array of them
pub fn parse_terms(json: &str) -> Result<Vec<RawTerms>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    match value {
        serde_json::Value::Array(_) => serde_json::from_value(value),
        _ => serde_json::from_value(value).map(|t| vec![t]),
    }
}

/// Load terms from a JSON file
pub fn load_terms<P: AsRef<Path>>(path: P) -> Result<Vec<RawTerms>, Box<dyn Error>> {
    let text = fs::read_to_string(path)?;
    Ok(parse_terms(&text)?)
}

/// Convert a batch, resolving id references among the batch itself
pub fn to_contracts(terms: &[RawTerms]) -> Result<Vec<Contract>, ActusError> {
    let by_id: HashMap<String, RawTerms> = terms
        .iter()
        .filter_map(|t| t.contract_id.clone().map(|id| (id, t.clone())))
        .collect();
    terms.iter().map(|t| t.to_contract_with(&by_id)).collect()
}
