use serde::{Deserialize, Serialize};

use super::fundamentals::Fundamentals;
use super::history::PriceHistory;
use super::quote::Quote;
use super::request::DataCategory;
use super::search::SearchResult;
use super::series::EconomicSeries;

/// A successful provider result. This is what the result cache stores.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    Quote(Quote),
    History(PriceHistory),
    Fundamentals(Fundamentals),
    Search(Vec<SearchResult>),
    Series(EconomicSeries),
}

impl Payload {
    pub fn category(&self) -> DataCategory {
        match self {
            Self::Quote(_) => DataCategory::Quote,
            Self::History(_) => DataCategory::History,
            Self::Fundamentals(_) => DataCategory::Fundamentals,
            Self::Search(_) => DataCategory::Search,
            Self::Series(_) => DataCategory::Macro,
        }
    }
}
