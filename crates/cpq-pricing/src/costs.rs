//! Cost aggregation across all entries of a quote.

use crate::bom::EntryBom;
use crate::{add, mul, sum, PricingError};
use cpq_core::MaterializedProductEntry;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Material and labor totals at full precision.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostSummary {
    pub total_material_cost: Decimal,
    pub total_labor_cost: Decimal,
    /// Material cost not covered by any wastage allowance.
    pub uncull_material_cost: Decimal,
}

impl CostSummary {
    /// COGS = material + labor.
    pub fn cost_of_goods_sold(&self) -> Result<Decimal, PricingError> {
        add(self.total_material_cost, self.total_labor_cost, "cost of goods sold")
    }
}

/// Labor of one entry: quantity × (base labor + option labor surcharges).
pub fn labor_cost(entry: &MaterializedProductEntry) -> Result<Decimal, PricingError> {
    let per_unit = entry
        .selected_options
        .iter()
        .try_fold(entry.product.unit_labor_cost, |acc, o| {
            add(acc, o.additional_labor_cost_per_product_unit, "labor per unit")
        })?;
    mul(entry.quantity, per_unit, "labor cost")
}

/// Sum material lines of every BOM and labor of every entry.
pub fn aggregate(
    entries: &[MaterializedProductEntry],
    boms: &[EntryBom],
) -> Result<CostSummary, PricingError> {
    let material = boms
        .iter()
        .map(EntryBom::material_cost)
        .collect::<Result<Vec<_>, _>>()?;
    let labor = entries
        .iter()
        .map(labor_cost)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CostSummary {
        total_material_cost: sum(material, "material cost")?,
        total_labor_cost: sum(labor, "labor cost")?,
        uncull_material_cost: sum(
            boms.iter().map(|b| b.uncull_material_cost),
            "uncull material cost",
        )?,
    })
}
