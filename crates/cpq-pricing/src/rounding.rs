//! Display rounding, applied once when a calculation snapshot is produced.

use crate::bom::EntryBom;
use crate::costs::CostSummary;
use crate::rates::PriceBreakdown;
use chrono::{DateTime, Utc};
use cpq_core::{AppliedRateInfo, BillOfMaterialEntry, CalculatedQuote, QuoteId};
use rust_decimal::{Decimal, RoundingStrategy};

/// Decimal places of persisted money values.
pub const MONEY_DP: u32 = 2;
/// Decimal places of persisted quantities and unit costs.
pub const QUANTITY_DP: u32 = 4;

/// Round half-up to cents, always carrying two decimal places.
///
/// Example:
/// round_money(4408.708333) == 4408.71, round_money(0.125) == 0.13
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(MONEY_DP, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_DP);
    rounded
}

/// Round half-up to four decimal places, dropping trailing zeros.
pub fn round_quantity(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(QUANTITY_DP, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

fn round_line(line: &BillOfMaterialEntry) -> BillOfMaterialEntry {
    BillOfMaterialEntry {
        quantity: round_quantity(line.quantity),
        unit_cost: round_quantity(line.unit_cost),
        total_cost: round_money(line.total_cost),
        cull_units: line.cull_units.map(round_quantity),
        leftovers: line.leftovers.map(round_quantity),
        ..line.clone()
    }
}

fn round_rate(rate: &AppliedRateInfo) -> AppliedRateInfo {
    AppliedRateInfo {
        rate_value: rate.rate_value.normalize(),
        applied_amount: round_money(rate.applied_amount),
        ..rate.clone()
    }
}

/// Assemble the persisted record from full-precision results.
///
/// Every value is rounded independently from its unrounded source, so
/// displayed parts may differ from displayed totals by a cent.
pub fn calculated_quote(
    quote_id: QuoteId,
    boms: &[EntryBom],
    costs: &CostSummary,
    breakdown: &PriceBreakdown,
    calculated_at: DateTime<Utc>,
) -> CalculatedQuote {
    CalculatedQuote {
        id: None,
        quote_id,
        bill_of_materials: boms
            .iter()
            .flat_map(|b| b.lines.iter())
            .map(round_line)
            .collect(),
        total_material_cost: round_money(costs.total_material_cost),
        total_labor_cost: round_money(costs.total_labor_cost),
        cost_of_goods_sold: round_money(breakdown.cost_of_goods_sold),
        applied_rates_info: breakdown.applied_rates.iter().map(round_rate).collect(),
        subtotal_before_tax: round_money(breakdown.subtotal_before_tax),
        tax_amount: round_money(breakdown.tax_amount),
        final_price: round_money(breakdown.final_price),
        calculated_at,
    }
}
