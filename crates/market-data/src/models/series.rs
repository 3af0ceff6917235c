use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A dated value of a macro-economic series. `value` is `None` when the
/// source reports the observation as missing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: Option<Decimal>,
}

/// Series metadata plus observations, ordered by date ascending.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EconomicSeries {
    pub series_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seasonal_adjustment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub observations: Vec<Observation>,
    pub source: String,
}

impl EconomicSeries {
    /// The two most recent observations that carry a value, newest first.
    pub fn latest_values(&self) -> (Option<&Observation>, Option<&Observation>) {
        let mut present = self.observations.iter().rev().filter(|o| o.value.is_some());
        (present.next(), present.next())
    }
}
