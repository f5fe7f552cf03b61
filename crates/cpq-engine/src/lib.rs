#![deny(warnings)]

//! Quote engine: assembles a quote from the catalog, prices it and stores
//! the result.
//!
//! [`QuoteCalculator`] is pure and works over any
//! [`CatalogSource`](cpq_core::CatalogSource);
//! [`QuoteService`] wraps it with the SQLite store.

pub mod assembly;
pub mod calculator;
pub mod error;
pub mod service;

pub use assembly::{assemble_quote, materialize_entry, QuoteLines};
pub use calculator::QuoteCalculator;
pub use error::{EngineError, ErrorKind};
pub use service::QuoteService;

use cpq_core::{CatalogData, QuoteId};
use serde::{Deserialize, Serialize};

/// A catalog document together with the quote to price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub quote_id: QuoteId,
    pub catalog: CatalogData,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Scenario;
    use cpq_core::{CatalogData, VariationOptionId};
    use rust_decimal::Decimal;
    use std::path::PathBuf;
    use std::str::FromStr;

    pub fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    /// 100 ft Postmaster Horizontal fence from `assets/scenarios`.
    pub fn reference_scenario() -> Scenario {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../assets/scenarios/postmaster_h_100ft.yaml");
        let text = std::fs::read_to_string(path).expect("read scenario");
        serde_yaml::from_str(&text).expect("parse scenario")
    }

    /// Swap the selected option `from` for `to` on every entry.
    pub fn select(data: &mut CatalogData, from: i64, to: i64) {
        for v in &mut data.entry_variations {
            if v.variation_option_id == VariationOptionId(from) {
                v.variation_option_id = VariationOptionId(to);
            }
        }
    }
}
