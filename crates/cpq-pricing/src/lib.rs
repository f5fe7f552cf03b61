#![deny(warnings)]

//! Pricing for fence quotes: bill of materials, cost totals and the rate
//! pipeline.
//!
//! This crate provides pure, decimal-exact helpers for:
//! - Expanding an entry's material usages into bill-of-materials lines
//! - Aggregating material and labor cost into cost of goods sold
//! - Applying commission, franchise fee, margin, fixed fees and tax in order
//! - Rounding results once for the persisted snapshot

pub mod bom;
pub mod costs;
pub mod rates;
pub mod rounding;

pub use bom::{build_bill_of_materials, EntryBom};
pub use costs::{aggregate, labor_cost, CostSummary};
pub use rates::{validate_quote_config, MarginConvention, PriceBreakdown, RatePipeline, RateStep};
pub use rounding::{calculated_quote, round_money, round_quantity};

use cpq_core::{EntryId, MaterialId, ValidationError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors produced by pricing.
#[derive(Debug, Error, PartialEq)]
pub enum PricingError {
    /// A rate is outside its valid domain.
    #[error("invalid quote config: {0}")]
    InvalidConfig(String),
    /// Options removed more material than the entry consumes.
    #[error("entry {entry}: material {material} ends with a negative quantity")]
    NegativeQuantity { entry: EntryId, material: MaterialId },
    /// A pipeline lists the same step twice.
    #[error("rate step {0} appears more than once")]
    DuplicateStep(RateStep),
    /// An intermediate value does not fit in a `Decimal`.
    #[error("decimal overflow computing {0}")]
    Overflow(&'static str),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub(crate) fn mul(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, PricingError> {
    a.checked_mul(b).ok_or(PricingError::Overflow(what))
}

pub(crate) fn add(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, PricingError> {
    a.checked_add(b).ok_or(PricingError::Overflow(what))
}

pub(crate) fn sum<I>(items: I, what: &'static str) -> Result<Decimal, PricingError>
where
    I: IntoIterator<Item = Decimal>,
{
    items
        .into_iter()
        .try_fold(Decimal::ZERO, |acc, x| add(acc, x, what))
}

#[cfg(test)]
pub(crate) mod test_support {
    use cpq_core::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    pub fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    pub fn material(id: i64, name: &str, cost: &str, per_supplier: &str) -> Material {
        Material {
            id: MaterialId(id),
            name: name.to_string(),
            description: None,
            cost_per_supplier_unit: dec(cost),
            supplier_unit_type_id: None,
            base_unit_type_id: UnitTypeId(1),
            quantity_in_supplier_unit: dec(per_supplier),
            cull_rate: None,
        }
    }

    pub fn usage(m: &Material, per_unit: &str, cull_included: bool) -> MaterialUsage {
        MaterialUsage {
            source: UsageSource::Base,
            material: m.clone(),
            unit_name: "each".to_string(),
            quantity_per_product_unit: dec(per_unit),
            cull_included,
        }
    }

    pub fn option_usage(
        option: i64,
        m: &Material,
        per_unit: &str,
        cull_included: bool,
    ) -> MaterialUsage {
        MaterialUsage {
            source: UsageSource::Option(VariationOptionId(option)),
            ..usage(m, per_unit, cull_included)
        }
    }

    pub fn option(name: &str, labor: &str) -> VariationOption {
        VariationOption {
            id: VariationOptionId(1),
            variation_group_id: VariationGroupId(1),
            name: name.to_string(),
            value_description: None,
            additional_price: Decimal::ZERO,
            price_multiplier: Decimal::ONE,
            additional_labor_cost_per_product_unit: dec(labor),
        }
    }

    /// Entry of a product with 13.00 labor per unit.
    pub fn entry(
        quantity: &str,
        base: Vec<MaterialUsage>,
        variation: Vec<MaterialUsage>,
    ) -> MaterializedProductEntry {
        MaterializedProductEntry {
            entry: QuoteProductEntry {
                id: EntryId(1),
                quote_id: QuoteId(1),
                product_id: ProductId(1),
                role: ProductRole::Main,
                quantity_of_product_units: dec(quantity),
                notes: None,
            },
            product: Product {
                id: ProductId(1),
                name: "Postmaster Horizontal".to_string(),
                product_unit_type_id: UnitTypeId(2),
                unit_labor_cost: dec("13"),
                description: None,
                image_url: None,
            },
            quantity: dec(quantity),
            selected_options: vec![],
            base_materials: base,
            variation_materials: variation,
        }
    }

    pub fn config(
        margin: &str,
        tax: &str,
        commission: &str,
        franchise: &str,
        fees: &str,
    ) -> QuoteConfig {
        QuoteConfig {
            id: QuoteConfigId(1),
            name: "Test".to_string(),
            margin_rate: dec(margin),
            tax_rate: dec(tax),
            sales_commission_rate: dec(commission),
            franchise_fee_rate: dec(franchise),
            additional_fixed_fees: dec(fees),
            material_cull_rate: None,
            round_up_materials: false,
        }
    }
}
