//! Bill-of-materials builder.
//!
//! Expands an entry's base and option material usages into one line per
//! material. Lines are never merged across entries.

use crate::{add, mul, sum, PricingError};
use cpq_core::{
    validate_material, validate_usage, BillOfMaterialEntry, EntryId, Material, MaterialId,
    MaterializedProductEntry,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::trace;

/// Bill of materials of one product entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryBom {
    pub entry_id: EntryId,
    pub lines: Vec<BillOfMaterialEntry>,
    /// Cost of consumption that no wastage mechanism has inflated.
    pub uncull_material_cost: Decimal,
}

impl EntryBom {
    /// Sum of line totals.
    pub fn material_cost(&self) -> Result<Decimal, PricingError> {
        sum(self.lines.iter().map(|l| l.total_cost), "material cost")
    }
}

struct Accumulator<'a> {
    material: &'a Material,
    unit_name: &'a str,
    /// Raw consumption subject to the material's cull rate.
    plain: Decimal,
    /// Consumption whose coefficient already includes wastage.
    pre_culled: Decimal,
}

/// Build the bill of materials for one entry.
///
/// For every material: `raw = Σ coefficient × quantity` over base and
/// selected-option rows; when the material has a cull rate the portion not
/// marked `cull_included` is inflated by `(1 + cull_rate)`. With `round_up`
/// the final quantity is rounded up to whole base units and the surplus is
/// reported as leftovers.
pub fn build_bill_of_materials(
    entry: &MaterializedProductEntry,
    round_up: bool,
) -> Result<EntryBom, PricingError> {
    let mut lines: Vec<Accumulator<'_>> = Vec::new();
    let mut index: BTreeMap<MaterialId, usize> = BTreeMap::new();

    for usage in entry.usages() {
        validate_material(&usage.material)?;
        validate_usage(&usage.material, usage.cull_included)?;
        let amount = mul(
            usage.quantity_per_product_unit,
            entry.quantity,
            "material quantity",
        )?;
        let slot = *index.entry(usage.material.id).or_insert_with(|| {
            lines.push(Accumulator {
                material: &usage.material,
                unit_name: &usage.unit_name,
                plain: Decimal::ZERO,
                pre_culled: Decimal::ZERO,
            });
            lines.len() - 1
        });
        let acc = &mut lines[slot];
        if usage.cull_included {
            acc.pre_culled = add(acc.pre_culled, amount, "material quantity")?;
        } else {
            acc.plain = add(acc.plain, amount, "material quantity")?;
        }
    }

    let mut bom = EntryBom {
        entry_id: entry.entry.id,
        lines: Vec::with_capacity(lines.len()),
        uncull_material_cost: Decimal::ZERO,
    };
    for acc in lines {
        let m = acc.material;
        let unit_cost = m
            .unit_cost()
            .ok_or(cpq_core::ValidationError::NonPositiveSupplierQuantity(m.id))?;
        let inflatable = acc.plain.max(Decimal::ZERO);
        let cull_units = m
            .effective_cull_rate()
            .map(|rate| mul(inflatable, rate, "cull units"))
            .transpose()?;
        let quantity = sum(
            [acc.plain, acc.pre_culled, cull_units.unwrap_or(Decimal::ZERO)],
            "material quantity",
        )?;
        if quantity < Decimal::ZERO {
            return Err(PricingError::NegativeQuantity {
                entry: entry.entry.id,
                material: m.id,
            });
        }
        let (quantity, leftovers) = if round_up {
            let whole = quantity.ceil();
            (whole, Some(whole - quantity).filter(|l| !l.is_zero()))
        } else {
            (quantity, None)
        };
        if cull_units.is_none() {
            bom.uncull_material_cost = add(
                bom.uncull_material_cost,
                mul(inflatable, unit_cost, "uncull material cost")?,
                "uncull material cost",
            )?;
        }
        let total_cost = mul(quantity, unit_cost, "line total")?;
        trace!(entry = %entry.entry.id, material = %m.id, %quantity, %unit_cost, "bom line");
        bom.lines.push(BillOfMaterialEntry {
            entry_id: entry.entry.id,
            material_id: m.id,
            material_name: m.name.clone(),
            quantity,
            unit_cost,
            total_cost,
            unit_name: acc.unit_name.to_string(),
            cull_units,
            leftovers,
        });
    }
    Ok(bom)
}
