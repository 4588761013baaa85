//! Annuity installment calculation

use chrono::NaiveDateTime;

use crate::terms::CommonTerms;

/// Level installment that repays `notional` plus `accrued` over `dates`.
///
/// Interest runs from `start` to the first date and between consecutive
/// dates; `accrued` is due with the first installment and bears no interest.
/// The balance is exactly zero after the last installment.
pub(crate) fn annuity_amount(
    common: &CommonTerms,
    start: NaiveDateTime,
    dates: &[NaiveDateTime],
    notional: f64,
    accrued: f64,
    rate: f64,
) -> f64 {
    if dates.is_empty() {
        return notional + accrued;
    }
    let conventions = &common.conventions;
    let growth: Vec<f64> = std::iter::once(start)
        .chain(dates.iter().copied())
        .collect::<Vec<_>>()
        .windows(2)
        .map(|w| {
            let from = conventions.business_day.shift_calc_time(w[0]);
            let to = conventions.business_day.shift_calc_time(w[1]);
            let y = if to > from { conventions.day_counter.fraction(from, to) } else { 0.0 };
            1.0 + rate * y
        })
        .collect();

    // growth of a payment made at date k up to the last date
    let mut tail = vec![1.0; growth.len()];
    for k in (0..growth.len().saturating_sub(1)).rev() {
        tail[k] = tail[k + 1] * growth[k + 1];
    }
    let debt = notional * tail[0] * growth[0] + accrued * tail[0];
    let payments: f64 = tail.iter().sum();
    debt / payments
}
