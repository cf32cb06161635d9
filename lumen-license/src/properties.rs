//! License properties carried in the signed text.
//!
//! The text is a list of `Key: Value` lines. Two keys are required:
//! - `Order`: the numeric license id
//! - `Valid-Until`: the last day (UTC) the license is valid, as `YYYY-MM-DD`

use crate::armor::split_lines;
use crate::error::{LicenseError, LicenseResult};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Property holding the license id.
pub const ORDER: &str = "Order";

/// Property holding the expiry date.
pub const VALID_UNTIL: &str = "Valid-Until";

/// Ordered `name -> value` pairs from a verified license text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseProperties {
    entries: Vec<(String, String)>,
}

impl LicenseProperties {
    /// Parses `Key: Value` lines. The value may itself contain `": "`.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::MalformedDocument`] for a line without a
    /// `": "` separator or a repeated key.
    pub fn parse(text: &str) -> LicenseResult<Self> {
        let mut entries: Vec<(String, String)> = Vec::new();

        for line in split_lines(text) {
            let (key, value) = line
                .split_once(": ")
                .ok_or_else(|| LicenseError::malformed(format!("invalid property line: {line:?}")))?;

            if entries.iter().any(|(k, _)| k == key) {
                return Err(LicenseError::malformed(format!("duplicate property: {key}")));
            }
            entries.push((key.to_string(), value.to_string()));
        }

        Ok(Self { entries })
    }

    /// Returns the value of a property.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Iterates properties in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `Order` property as a base-10 integer.
    pub fn order_id(&self) -> LicenseResult<i64> {
        let raw = self.required(ORDER)?;
        raw.parse::<i64>()
            .map_err(|e| LicenseError::invalid_field(ORDER, format!("{raw:?} is not an integer: {e}")))
    }

    /// The `Valid-Until` property as a calendar date.
    pub fn valid_until(&self) -> LicenseResult<NaiveDate> {
        let raw = self.required(VALID_UNTIL)?;
        if !is_iso_date_shape(raw) {
            return Err(LicenseError::invalid_field(
                VALID_UNTIL,
                format!("{raw:?} is not a YYYY-MM-DD date"),
            ));
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| LicenseError::invalid_field(VALID_UNTIL, format!("{raw:?} is not a date: {e}")))
    }

    /// Last instant the license is valid: one second before the start of the
    /// day after `Valid-Until`, in UTC.
    pub fn expires_at(&self) -> LicenseResult<DateTime<Utc>> {
        let date = self.valid_until()?;
        date.succ_opt()
            .and_then(|next| next.and_hms_opt(0, 0, 0))
            .map(|midnight| midnight.and_utc() - TimeDelta::seconds(1))
            .ok_or_else(|| LicenseError::invalid_field(VALID_UNTIL, "date out of range"))
    }

    fn required(&self, key: &str) -> LicenseResult<&str> {
        self.get(key)
            .ok_or_else(|| LicenseError::invalid_field(key, "missing"))
    }
}

/// Exactly `DDDD-DD-DD`; chrono alone also takes `2024-1-5` and `+2024-01-31`.
fn is_iso_date_shape(raw: &str) -> bool {
    raw.len() == 10
        && raw.bytes().enumerate().all(|(i, b)| match i {
            4 | 7 => b == b'-',
            _ => b.is_ascii_digit(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_may_contain_separator() {
        let props = LicenseProperties::parse("Note: a: b: c").unwrap();
        assert_eq!(props.get("Note"), Some("a: b: c"));
    }

    #[test]
    fn keeps_document_order() {
        let props = LicenseProperties::parse("Zeta: 1\r\nAlpha: 2\r\nMid: 3").unwrap();
        let keys: Vec<_> = props.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Zeta", "Alpha", "Mid"]);
        assert_eq!(props.len(), 3);
    }

    #[test]
    fn duplicate_key_is_malformed() {
        let err = LicenseProperties::parse("Order: 1\r\nOrder: 2").unwrap_err();
        assert!(matches!(err, LicenseError::MalformedDocument(_)));
    }

    #[test]
    fn empty_line_is_malformed() {
        let err = LicenseProperties::parse("Order: 1\r\n\r\nValid-Until: 2031-01-01").unwrap_err();
        assert!(matches!(err, LicenseError::MalformedDocument(_)));
    }

    #[test]
    fn missing_order_is_invalid_field() {
        let props = LicenseProperties::parse("Valid-Until: 2031-01-01").unwrap();
        match props.order_id() {
            Err(LicenseError::InvalidField { field, .. }) => assert_eq!(field, ORDER),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_non_iso_dates() {
        let props = LicenseProperties::parse("Valid-Until: 31/01/2024").unwrap();
        assert!(matches!(
            props.valid_until(),
            Err(LicenseError::InvalidField { .. })
        ));
    }

    #[test]
    fn leap_day_expiry() {
        let props = LicenseProperties::parse("Valid-Until: 2024-02-29").unwrap();
        assert_eq!(
            props.expires_at().unwrap().to_rfc3339(),
            "2024-02-29T23:59:59+00:00"
        );
    }
}
