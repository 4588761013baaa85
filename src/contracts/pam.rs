//! Principal at maturity

use chrono::NaiveDateTime;
use std::collections::BTreeSet;

use super::common::{self, recurrence_dates};
use super::functions::{LoanRules, Step};
use super::StateMachine;
use crate::error::{ActusError, ObservationError};
use crate::events::{ContractEvent, EventType};
use crate::projection::StateSpace;
use crate::terms::{CommonTerms, LoanTerms, PamTerms};

/// Interest payment dates: the payment recurrence up to maturity, or
/// maturity alone when no recurrence is given
pub(super) fn interest_dates(
    common: &CommonTerms,
    loan: &LoanTerms,
    maturity: NaiveDateTime,
) -> Result<BTreeSet<NaiveDateTime>, ActusError> {
    if loan.interest.payment.is_defined() {
        recurrence_dates(common, &loan.interest.payment, maturity, true)
    } else {
        Ok([maturity].into_iter().collect())
    }
}

/// Events every bullet-style loan shares: interest (with capitalization),
/// rate resets, fees and scaling up to `end`
pub(super) fn loan_feature_events(
    common: &CommonTerms,
    loan: &LoanTerms,
    interest: &BTreeSet<NaiveDateTime>,
    end: NaiveDateTime,
) -> Result<Vec<ContractEvent>, ActusError> {
    let mut events = common::interest_events(interest, loan.interest.capitalization_end_date, common);
    events.extend(common::rate_reset_events(common, &loan.rate_reset, end)?);
    events.extend(common::fee_events(common, &loan.fee, end)?);
    events.extend(common::scaling_events(common, &loan.scaling, end)?);
    Ok(events)
}

impl StateMachine for PamTerms {
    fn common(&self) -> &CommonTerms {
        &self.common
    }

    fn maturity(&self) -> Result<Option<NaiveDateTime>, ActusError> {
        Ok(Some(self.maturity_date))
    }

    fn events(
        &self,
        _maturity: Option<NaiveDateTime>,
        _horizon: Option<NaiveDateTime>,
    ) -> Result<Vec<ContractEvent>, ActusError> {
        let md = self.maturity_date;
        let interest = if !self.loan.interest.payment.is_defined() && self.loan.interest.capitalization_end_date.is_some()
        {
            BTreeSet::new()
        } else {
            interest_dates(&self.common, &self.loan, md)?
        };

        let mut events = vec![
            ContractEvent::shifted(self.loan.initial_exchange_date, EventType::IED, &self.common),
            ContractEvent::shifted(md, EventType::MD, &self.common),
        ];
        events.extend(loan_feature_events(&self.common, &self.loan, &interest, md)?);
        Ok(events)
    }

    fn init_state(&self, maturity: Option<NaiveDateTime>) -> Result<StateSpace, ActusError> {
        let interest = interest_dates(&self.common, &self.loan, self.maturity_date)?;
        Ok(LoanRules::new(&self.loan).init_state(&self.common, maturity, &interest))
    }

    fn transition(&self, step: &Step<'_>, state: &mut StateSpace) -> Result<f64, ObservationError> {
        let rules = LoanRules::new(&self.loan);
        rules.evaluate(step, state).unwrap_or_else(|| {
            rules.accrue(step, state);
            Ok(0.0)
        })
    }
}
