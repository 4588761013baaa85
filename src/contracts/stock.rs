//! Stock position: purchase, dividends, termination

use chrono::NaiveDateTime;

use super::common;
use super::functions::{required_code, Step};
use super::StateMachine;
use crate::error::{ActusError, ObservationError};
use crate::events::{ContractEvent, EventType};
use crate::projection::StateSpace;
use crate::terms::{CommonTerms, StockTerms};
use crate::time::Period;

/// Dividend schedules without a horizon or termination stop after this long
const DIVIDEND_SPAN_YEARS: i32 = 10;

impl StockTerms {
    fn position(&self) -> f64 {
        self.common.role_sign() * self.quantity
    }
}

impl StateMachine for StockTerms {
    fn common(&self) -> &CommonTerms {
        &self.common
    }

    fn interest_bearing(&self) -> bool {
        false
    }

    fn maturity(&self) -> Result<Option<NaiveDateTime>, ActusError> {
        Ok(None)
    }

    fn events(
        &self,
        _maturity: Option<NaiveDateTime>,
        horizon: Option<NaiveDateTime>,
    ) -> Result<Vec<ContractEvent>, ActusError> {
        let Some(anchor) = self.dividend.anchor else {
            return Ok(Vec::new());
        };
        let end = [
            horizon,
            self.common.termination.map(|t| t.date),
            Some(
                Period::years(DIVIDEND_SPAN_YEARS)
                    .add_to(anchor)
                    .map_err(|e| ActusError::schedule(&self.common.contract_id, e))?,
            ),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(anchor);

        let dates = common::dates(&self.common, anchor, end, self.dividend.cycle.as_ref(), false)?;
        Ok(common::events_at(&dates, EventType::DV, &self.common))
    }

    fn init_state(&self, _maturity: Option<NaiveDateTime>) -> Result<StateSpace, ActusError> {
        let mut state = StateSpace::new(self.common.status_date);
        state.contract_performance = self.common.contract_performance;
        state.notional_principal = self.position();
        Ok(state)
    }

    fn transition(&self, step: &Step<'_>, state: &mut StateSpace) -> Result<f64, ObservationError> {
        let payoff = match step.event.event_type {
            EventType::DV => {
                let per_share = match self.next_dividend_payment_amount {
                    Some(amount) => amount,
                    None => {
                        let code = required_code(&self.dividend_market_object_code, "marketObjectCodeOfDividends")?;
                        step.observe(code, step.time(), state)?
                    }
                };
                self.position() * per_share
            }
            EventType::PRD => -self.position() * self.common.purchase.map_or(0.0, |p| p.price),
            EventType::TD => {
                let payoff = self.position() * self.common.termination.map_or(0.0, |t| t.price);
                state.notional_principal = 0.0;
                payoff
            }
            _ => 0.0,
        };
        state.status_date = step.time();
        Ok(payoff)
    }
}

#[cfg(test)]
mod tests {
    use crate::contracts::ContractAlgorithm;
    use crate::events::EventType;
    use crate::risk::{MarketModel, TimeSeries};
    use crate::terms::{Contract, RawTerms};
    use approx::assert_relative_eq;
    use chrono::{NaiveDate, NaiveDateTime};
    use serde_json::json;

    fn dt(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn terms() -> serde_json::Value {
        json!({
            "contractType": "STK",
            "contractID": "stk01",
            "statusDate": "2025-01-01",
            "contractRole": "RPA",
            "currency": "USD",
            "dayCountConvention": "AA",
            "quantity": 10,
            "cycleAnchorDateOfDividendPayment": "2025-03-31",
            "cycleOfDividendPayment": "P3ML1",
            "nextDividendPaymentAmount": 0.5,
            "purchaseDate": "2025-01-01",
            "priceAtPurchaseDate": 100,
            "terminationDate": "2025-12-31",
            "priceAtTerminationDate": 110
        })
    }

    fn contract(value: serde_json::Value) -> Contract {
        serde_json::from_value::<RawTerms>(value).unwrap().to_contract().unwrap()
    }

    #[test]
    fn test_buy_hold_sell() {
        let result = contract(terms()).simulate(None, &MarketModel::new()).unwrap();
        let flows: Vec<_> = result.events.iter().map(|e| (e.event_time, e.event_type, e.payoff)).collect();
        assert_eq!(
            flows,
            vec![
                (dt(2025, 1, 1), EventType::PRD, -1000.0),
                (dt(2025, 3, 31), EventType::DV, 5.0),
                (dt(2025, 6, 30), EventType::DV, 5.0),
                (dt(2025, 9, 30), EventType::DV, 5.0),
                (dt(2025, 12, 31), EventType::TD, 1100.0),
            ]
        );
        assert_relative_eq!(result.state.notional_principal, 0.0);
    }

    #[test]
    fn test_observed_dividend() {
        let mut t = terms();
        t["nextDividendPaymentAmount"] = json!(null);
        t["marketObjectCodeOfDividends"] = json!("DIV_X");
        let market = MarketModel::new().with_series("DIV_X", TimeSeries::from_points([(dt(2025, 1, 1), 0.7)]));
        let result = contract(t).simulate(None, &market).unwrap();
        let dividend = result.events.iter().find(|e| e.event_type == EventType::DV).unwrap();
        assert_relative_eq!(dividend.payoff, 7.0, epsilon = 1e-12);
    }

    #[test]
    fn test_short_position_and_horizon() {
        let mut t = terms();
        t["contractRole"] = json!("RPL");
        t["terminationDate"] = json!(null);
        let result = contract(t).simulate(Some(dt(2025, 7, 1)), &MarketModel::new()).unwrap();
        let dividends: Vec<_> = result.events.iter().filter(|e| e.event_type == EventType::DV).collect();
        assert_eq!(dividends.len(), 2);
        assert!(dividends.iter().all(|e| e.payoff < 0.0));
        assert_relative_eq!(result.events[0].payoff, 1000.0);
    }
}
