//! Calculation output records.

use crate::ids::*;
use crate::ParseEnumError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One material line of an entry's bill of materials.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillOfMaterialEntry {
    pub entry_id: EntryId,
    pub material_id: MaterialId,
    pub material_name: String,
    /// Final quantity in base units, after cull and rounding up.
    pub quantity: Decimal,
    /// Cost per base unit.
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub unit_name: String,
    /// Base units added by the material's cull rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cull_units: Option<Decimal>,
    /// Surplus base units bought because of rounding up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leftovers: Option<Decimal>,
}

/// How an applied rate was computed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateKind {
    /// Percentage of material cost not already carrying a wastage allowance.
    CullUplift,
    /// Percentage of cost of goods sold.
    FeeOnCogs,
    /// Margin on cost of goods sold.
    Margin,
    /// Flat amount.
    FeeFixed,
    /// Percentage of the pre-tax total.
    Tax,
}

impl RateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateKind::CullUplift => "cull_uplift",
            RateKind::FeeOnCogs => "fee_on_cogs",
            RateKind::Margin => "margin",
            RateKind::FeeFixed => "fee_fixed",
            RateKind::Tax => "tax",
        }
    }
}

impl fmt::Display for RateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RateKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cull_uplift" => Ok(RateKind::CullUplift),
            "fee_on_cogs" => Ok(RateKind::FeeOnCogs),
            "margin" => Ok(RateKind::Margin),
            "fee_fixed" => Ok(RateKind::FeeFixed),
            "tax" => Ok(RateKind::Tax),
            other => Err(ParseEnumError::new("rate kind", other)),
        }
    }
}

/// A rate applied during pricing, kept for display and audit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedRateInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: RateKind,
    /// Fraction for percentage rates, the amount itself for flat fees.
    pub rate_value: Decimal,
    pub applied_amount: Decimal,
}

/// Immutable result of one quote calculation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculatedQuote {
    /// Assigned once the snapshot is persisted.
    #[serde(default)]
    pub id: Option<CalculatedQuoteId>,
    pub quote_id: QuoteId,
    pub bill_of_materials: Vec<BillOfMaterialEntry>,
    pub total_material_cost: Decimal,
    pub total_labor_cost: Decimal,
    pub cost_of_goods_sold: Decimal,
    pub applied_rates_info: Vec<AppliedRateInfo>,
    pub subtotal_before_tax: Decimal,
    pub tax_amount: Decimal,
    pub final_price: Decimal,
    pub calculated_at: DateTime<Utc>,
}
