//! Product entries resolved against the catalog, ready for pricing.

use crate::ids::VariationOptionId;
use crate::model::{Material, Product, VariationOption};
use crate::quote::QuoteProductEntry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Where a material usage comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "option_id")]
pub enum UsageSource {
    /// A base product-material association.
    Base,
    /// A material row of a selected variation option.
    Option(VariationOptionId),
}

/// One material consumption coefficient with its resolved material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialUsage {
    pub source: UsageSource,
    pub material: Material,
    /// Name of the material's base unit.
    pub unit_name: String,
    /// Base units per product unit; negative for options that remove material.
    pub quantity_per_product_unit: Decimal,
    pub cull_included: bool,
}

/// A quote entry with everything pricing needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedProductEntry {
    pub entry: QuoteProductEntry,
    pub product: Product,
    pub quantity: Decimal,
    pub selected_options: Vec<VariationOption>,
    pub base_materials: Vec<MaterialUsage>,
    pub variation_materials: Vec<MaterialUsage>,
}

impl MaterializedProductEntry {
    /// Base usages followed by option usages.
    pub fn usages(&self) -> impl Iterator<Item = &MaterialUsage> {
        self.base_materials
            .iter()
            .chain(self.variation_materials.iter())
    }

    /// Labor per product unit including option surcharges.
    pub fn labor_per_unit(&self) -> Decimal {
        self.product.unit_labor_cost
            + self
                .selected_options
                .iter()
                .map(|o| o.additional_labor_cost_per_product_unit)
                .sum::<Decimal>()
    }
}
