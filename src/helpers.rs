use bigdecimal::{
    num_bigint::{BigInt, Sign},
    BigDecimal, RoundingMode,
};
use chrono::{DateTime, Days, NaiveDate, TimeDelta, Utc};

/// Decimal places kept for share quantities.
pub const QUANTITY_SCALE: i64 = 6;

/// Decimal places kept for INR amounts and prices.
pub const MONEY_SCALE: i64 = 4;

/// Integer digits that fit `NUMERIC(24, 6)`.
pub const MAX_QUANTITY_INTEGER_DIGITS: i64 = 24 - QUANTITY_SCALE;

/// Integer digits that fit `NUMERIC(24, 4)`.
pub const MAX_MONEY_INTEGER_DIGITS: i64 = 24 - MONEY_SCALE;

/// Largest decimal scale accepted from input before rounding.
pub const MAX_INPUT_SCALE: i64 = 64;

/// Fee charged on every grant, in percent of the purchase amount.
pub const FEE_PERCENT: i64 = 1;

pub fn round_quantity(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(QUANTITY_SCALE, RoundingMode::HalfUp)
}

pub fn round_money(value: &BigDecimal) -> BigDecimal {
    value.with_scale_round(MONEY_SCALE, RoundingMode::HalfUp)
}

/// Fixed-point rendering with exactly `scale` decimals, rounded half-up.
pub fn to_fixed(value: &BigDecimal, scale: i64) -> String {
    value
        .with_scale_round(scale, RoundingMode::HalfUp)
        .to_plain_string()
}

/// Digits left of the decimal point, read from the unscaled representation
/// so that huge exponents are never expanded.
pub fn integer_digits(value: &BigDecimal) -> i64 {
    let (digits, exponent) = value.as_bigint_and_exponent();
    if digits.sign() == Sign::NoSign {
        return 0;
    }

    let count = i64::try_from(digits.magnitude().to_string().len())
        .unwrap_or(i64::MAX);

    count.saturating_sub(exponent).max(0)
}

pub fn fee_rate() -> BigDecimal {
    BigDecimal::new(BigInt::from(FEE_PERCENT), 2)
}

pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Last representable instant of `date` at the store's microsecond precision.
pub fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + TimeDelta::days(1) - TimeDelta::microseconds(1)
}

/// Finalized days: `start..=today - 1`. Empty when `start` is not before
/// `today`.
pub fn finalized_days(start: NaiveDate, today: NaiveDate) -> Vec<NaiveDate> {
    let end = match today.checked_sub_days(Days::new(1)) {
        Some(end) => end,
        None => return vec![],
    };

    start.iter_days().take_while(|day| *day <= end).collect()
}

pub fn parse_tuple_string(data: String) -> Vec<String> {
    if data.is_empty() {
        return vec![];
    }

    let str = &data[1..];
    let splited = str.split(",(");
    let mut items: Vec<String> = Vec::new();

    for c in splited {
        if let Some(index) = c.find(')') {
            let tuple_data = &c[0..index];
            items.push(tuple_data.to_owned());
        }
    }

    items
}
