use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::errors::ExtractionError;
use crate::extract::ExtractedSignals;

const CURRENCY_DP: u32 = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionSettings {
    pub threshold: Decimal,
    pub buffer_days: u32,
    pub increase_pct: Decimal,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self { threshold: Decimal::ZERO, buffer_days: 4, increase_pct: Decimal::TEN }
    }
}

/// Validated projection inputs. Only constructible when the required
/// signals were extracted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectionInput {
    pub current_balance: Decimal,
    pub next_month_mrc: Decimal,
    pub daily_run_rate: Decimal,
}

impl ProjectionInput {
    pub fn from_signals(signals: &ExtractedSignals) -> Result<Self, ExtractionError> {
        match (signals.current_balance, signals.daily_run_rate) {
            (Some(current_balance), Some(daily_run_rate)) => Ok(Self {
                current_balance,
                next_month_mrc: signals.next_month_mrc.unwrap_or(Decimal::ZERO),
                daily_run_rate,
            }),
            _ => Err(ExtractionError::MissingSignals { missing: signals.missing_required() }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projection {
    pub remaining: Decimal,
    pub alert: bool,
    pub suggested_credit_limit: Option<Decimal>,
}

/// `remaining = limit - |balance| - mrc - buffer_days * daily_run_rate`.
///
/// Month-to-date usage is already reflected in the balance and is not
/// subtracted again. Amounts outside `Decimal` range fail with
/// [`ExtractionError::Overflow`].
pub fn project(
    credit_limit: Decimal,
    input: &ProjectionInput,
    settings: &ProjectionSettings,
) -> Result<Projection, ExtractionError> {
    let buffer = Decimal::from(settings.buffer_days)
        .checked_mul(input.daily_run_rate)
        .ok_or(ExtractionError::Overflow("buffer"))?;
    let remaining = credit_limit
        .checked_sub(input.current_balance.abs())
        .and_then(|value| value.checked_sub(input.next_month_mrc))
        .and_then(|value| value.checked_sub(buffer))
        .ok_or(ExtractionError::Overflow("remaining"))?;
    let remaining = round_currency(remaining);
    let alert = remaining < settings.threshold;
    let suggested_credit_limit = if alert {
        Some(suggested_limit(credit_limit, settings.increase_pct)?)
    } else {
        None
    };

    Ok(Projection { remaining, alert, suggested_credit_limit })
}

pub fn suggested_limit(
    credit_limit: Decimal,
    increase_pct: Decimal,
) -> Result<Decimal, ExtractionError> {
    Decimal::ONE
        .checked_add(increase_pct / Decimal::ONE_HUNDRED)
        .and_then(|factor| factor.checked_mul(credit_limit))
        .map(round_currency)
        .ok_or(ExtractionError::Overflow("suggested credit limit"))
}

/// Two fraction digits, always: `11000` renders as `11000.00`.
fn round_currency(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_DP);
    rounded
}
