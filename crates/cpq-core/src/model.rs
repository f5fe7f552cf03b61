//! Catalog reference data: units, materials, products and their variations.

use crate::ids::*;
use crate::ParseEnumError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A unit of measure, e.g. "each", "linear foot", "bag".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitType {
    pub id: UnitTypeId,
    pub name: String,
    /// Free-form grouping such as "count" or "length".
    pub category: String,
}

/// A purchasable material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    pub id: MaterialId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Price paid per unit as purchased from the supplier.
    pub cost_per_supplier_unit: Decimal,
    #[serde(default)]
    pub supplier_unit_type_id: Option<UnitTypeId>,
    /// Unit in which products consume the material.
    pub base_unit_type_id: UnitTypeId,
    /// Base units contained in one supplier unit (> 0).
    pub quantity_in_supplier_unit: Decimal,
    /// Wastage fraction added on top of raw consumption (e.g. 0.05).
    #[serde(default)]
    pub cull_rate: Option<Decimal>,
}

impl Material {
    /// Cost of one base unit, or `None` when the supplier quantity is zero.
    ///
    /// Example:
    /// a box of 1000 nails at 10.00 costs 0.01 per nail.
    pub fn unit_cost(&self) -> Option<Decimal> {
        self.cost_per_supplier_unit
            .checked_div(self.quantity_in_supplier_unit)
    }

    /// Cull rate when it is set and non-zero.
    pub fn effective_cull_rate(&self) -> Option<Decimal> {
        self.cull_rate.filter(|r| !r.is_zero())
    }
}

/// A sellable item priced per product unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub product_unit_type_id: UnitTypeId,
    /// Base labor cost per product unit.
    pub unit_labor_cost: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Material always consumed per unit of a product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductMaterial {
    pub id: ProductMaterialId,
    pub product_id: ProductId,
    pub material_id: MaterialId,
    pub quantity_of_material_base_units_per_product_unit: Decimal,
    /// The coefficient already carries the wastage allowance.
    #[serde(default)]
    pub cull_included: bool,
}

/// How many options of a group may be selected on one entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionType {
    #[default]
    SingleChoice,
    MultiChoice,
}

impl SelectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionType::SingleChoice => "single_choice",
            SelectionType::MultiChoice => "multi_choice",
        }
    }
}

impl fmt::Display for SelectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single_choice" => Ok(SelectionType::SingleChoice),
            "multi_choice" => Ok(SelectionType::MultiChoice),
            other => Err(ParseEnumError::new("selection type", other)),
        }
    }
}

/// A configurable choice axis on a product, e.g. "Finish".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationGroup {
    pub id: VariationGroupId,
    pub product_id: ProductId,
    pub name: String,
    #[serde(default)]
    pub selection_type: SelectionType,
    #[serde(default)]
    pub is_required: bool,
}

fn one() -> Decimal {
    Decimal::ONE
}

/// A selectable value of a variation group, e.g. "Stained".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationOption {
    pub id: VariationOptionId,
    pub variation_group_id: VariationGroupId,
    pub name: String,
    #[serde(default)]
    pub value_description: Option<String>,
    /// Display-only price hint; not part of the calculated price.
    #[serde(default)]
    pub additional_price: Decimal,
    /// Display-only multiplier hint; not part of the calculated price.
    #[serde(default = "one")]
    pub price_multiplier: Decimal,
    #[serde(default)]
    pub additional_labor_cost_per_product_unit: Decimal,
}

/// Material added (or removed, when negative) per product unit by an option.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariationOptionMaterial {
    pub id: VariationOptionMaterialId,
    pub variation_option_id: VariationOptionId,
    pub material_id: MaterialId,
    pub quantity_of_material_base_units_added: Decimal,
    #[serde(default)]
    pub cull_included: bool,
}
