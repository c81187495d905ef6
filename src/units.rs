//! Model units and unit-tagged values.
//!
//! Conversion factors are relative to the SI base of each family, so
//! converting between two members is `amount * from.factor / to.factor`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnits {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnits {
    /// Seconds per unit.
    pub fn conversion_factor(self) -> f64 {
        match self {
            TimeUnits::Millisecond => 0.001,
            TimeUnits::Second => 1.0,
            TimeUnits::Minute => 60.0,
            TimeUnits::Hour => 3600.0,
            TimeUnits::Day => 86400.0,
            TimeUnits::Week => 604800.0,
            TimeUnits::Month => 2592000.0,
            TimeUnits::Year => 3.1536e7,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TimeUnits::Millisecond => "ms",
            TimeUnits::Second => "sec",
            TimeUnits::Minute => "min",
            TimeUnits::Hour => "hr",
            TimeUnits::Day => "day",
            TimeUnits::Week => "wk",
            TimeUnits::Month => "mn",
            TimeUnits::Year => "yr",
        }
    }

    pub fn modifier(self, units: TimeUnits) -> f64 {
        self.conversion_factor() / units.conversion_factor()
    }

    pub fn convert_to(self, amount: f64, units: TimeUnits) -> f64 {
        amount * self.modifier(units)
    }

    pub fn name(self) -> &'static str {
        match self {
            TimeUnits::Millisecond => "MILLISECOND",
            TimeUnits::Second => "SECOND",
            TimeUnits::Minute => "MINUTE",
            TimeUnits::Hour => "HOUR",
            TimeUnits::Day => "DAY",
            TimeUnits::Week => "WEEK",
            TimeUnits::Month => "MONTH",
            TimeUnits::Year => "YEAR",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            TimeUnits::Millisecond,
            TimeUnits::Second,
            TimeUnits::Minute,
            TimeUnits::Hour,
            TimeUnits::Day,
            TimeUnits::Week,
            TimeUnits::Month,
            TimeUnits::Year,
        ]
        .into_iter()
        .find(|u| u.name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LengthUnits {
    Millimeter,
    Centimeter,
    Meter,
    Kilometer,
    Inch,
    Foot,
    Yard,
    Mile,
    NauticalMile,
}

impl LengthUnits {
    /// Meters per unit.
    pub fn conversion_factor(self) -> f64 {
        match self {
            LengthUnits::Millimeter => 0.001,
            LengthUnits::Centimeter => 0.01,
            LengthUnits::Meter => 1.0,
            LengthUnits::Kilometer => 1000.0,
            LengthUnits::Inch => 0.0254,
            LengthUnits::Foot => 0.3048,
            LengthUnits::Yard => 0.9144,
            LengthUnits::Mile => 1609.344,
            LengthUnits::NauticalMile => 1853.184,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            LengthUnits::Millimeter => "mm",
            LengthUnits::Centimeter => "cm",
            LengthUnits::Meter => "m",
            LengthUnits::Kilometer => "km",
            LengthUnits::Inch => "in",
            LengthUnits::Foot => "ft",
            LengthUnits::Yard => "yd",
            LengthUnits::Mile => "mi",
            LengthUnits::NauticalMile => "nm",
        }
    }

    pub fn modifier(self, units: LengthUnits) -> f64 {
        self.conversion_factor() / units.conversion_factor()
    }

    pub fn convert_to(self, amount: f64, units: LengthUnits) -> f64 {
        amount * self.modifier(units)
    }
}

/// Rates are "per time unit", so the modifier is the inverse of the time modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateUnits {
    PerMillisecond,
    PerSecond,
    PerMinute,
    PerHour,
    PerDay,
    PerWeek,
    PerMonth,
    PerYear,
}

impl RateUnits {
    pub fn time_unit(self) -> TimeUnits {
        match self {
            RateUnits::PerMillisecond => TimeUnits::Millisecond,
            RateUnits::PerSecond => TimeUnits::Second,
            RateUnits::PerMinute => TimeUnits::Minute,
            RateUnits::PerHour => TimeUnits::Hour,
            RateUnits::PerDay => TimeUnits::Day,
            RateUnits::PerWeek => TimeUnits::Week,
            RateUnits::PerMonth => TimeUnits::Month,
            RateUnits::PerYear => TimeUnits::Year,
        }
    }

    pub fn modifier(self, units: RateUnits) -> f64 {
        1.0 / self.time_unit().modifier(units.time_unit())
    }

    pub fn convert_to(self, amount: f64, units: RateUnits) -> f64 {
        amount * self.modifier(units)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeedUnits {
    Mps,
    Kph,
    Fps,
    Fpm,
    Mph,
    Kn,
}

impl SpeedUnits {
    fn parts(self) -> (LengthUnits, TimeUnits) {
        match self {
            SpeedUnits::Mps => (LengthUnits::Meter, TimeUnits::Second),
            SpeedUnits::Kph => (LengthUnits::Kilometer, TimeUnits::Hour),
            SpeedUnits::Fps => (LengthUnits::Foot, TimeUnits::Second),
            SpeedUnits::Fpm => (LengthUnits::Foot, TimeUnits::Minute),
            SpeedUnits::Mph => (LengthUnits::Mile, TimeUnits::Hour),
            SpeedUnits::Kn => (LengthUnits::NauticalMile, TimeUnits::Hour),
        }
    }

    pub fn modifier(self, units: SpeedUnits) -> f64 {
        let (length, time) = self.parts();
        let (other_length, other_time) = units.parts();
        length.modifier(other_length) / time.modifier(other_time)
    }

    pub fn convert_to(self, amount: f64, units: SpeedUnits) -> f64 {
        amount * self.modifier(units)
    }
}

/// A number tagged with the name of its unit (e.g. `180 DAY`).
///
/// Serialized the way the server expects unit-typed fields:
/// `{"value": 180.0, "units": "DAY"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitValue {
    pub value: f64,
    pub units: String,
}

impl UnitValue {
    pub fn new(value: f64, units: impl Into<String>) -> Self {
        Self {
            value,
            units: units.into(),
        }
    }

    pub fn time(value: f64, units: TimeUnits) -> Self {
        Self::new(value, units.name())
    }

    /// Convert to another time unit, if this value carries one.
    pub fn as_time(&self, units: TimeUnits) -> Option<f64> {
        TimeUnits::from_name(&self.units).map(|from| from.convert_to(self.value, units))
    }
}

impl fmt::Display for UnitValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_conversion() {
        assert_eq!(TimeUnits::Day.convert_to(2.0, TimeUnits::Hour), 48.0);
        assert_eq!(TimeUnits::Minute.convert_to(90.0, TimeUnits::Second), 5400.0);
    }

    #[test]
    fn test_rate_conversion_is_inverse_of_time() {
        let per_hour = RateUnits::PerDay.convert_to(24.0, RateUnits::PerHour);
        assert!((per_hour - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_speed_conversion() {
        let kph = SpeedUnits::Mps.convert_to(10.0, SpeedUnits::Kph);
        assert!((kph - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_unit_value_wire_format() {
        let value = UnitValue::time(180.0, TimeUnits::Day);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json, serde_json::json!({"value": 180.0, "units": "DAY"}));
        assert_eq!(value.as_time(TimeUnits::Week).map(|w| w.round()), Some(26.0));
        assert_eq!(value.to_string(), "180 DAY");
    }
}
