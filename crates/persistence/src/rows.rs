//! Row shapes as stored in SQLite and their conversion to domain types.

use crate::PersistenceError;
use chrono::{DateTime, Utc};
use cpq_core::*;
use rust_decimal::Decimal;
use sqlx::FromRow;
use std::str::FromStr;

pub(crate) fn decimal(column: &'static str, raw: &str) -> Result<Decimal, PersistenceError> {
    Decimal::from_str(raw).map_err(|e| PersistenceError::Decode {
        column,
        message: e.to_string(),
    })
}

fn opt_decimal(
    column: &'static str,
    raw: Option<String>,
) -> Result<Option<Decimal>, PersistenceError> {
    raw.map(|s| decimal(column, &s)).transpose()
}

pub(crate) fn timestamp(column: &'static str, raw: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Decode {
            column,
            message: e.to_string(),
        })
}

fn parse_enum<T>(column: &'static str, raw: &str) -> Result<T, PersistenceError>
where
    T: FromStr<Err = ParseEnumError>,
{
    raw.parse().map_err(|e: ParseEnumError| PersistenceError::Decode {
        column,
        message: e.to_string(),
    })
}

#[derive(Debug, FromRow)]
pub(crate) struct UnitTypeRow {
    id: i64,
    name: String,
    category: String,
}

impl From<UnitTypeRow> for UnitType {
    fn from(r: UnitTypeRow) -> Self {
        UnitType {
            id: UnitTypeId(r.id),
            name: r.name,
            category: r.category,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct MaterialRow {
    id: i64,
    name: String,
    description: Option<String>,
    cost_per_supplier_unit: String,
    supplier_unit_type_id: Option<i64>,
    base_unit_type_id: i64,
    quantity_in_supplier_unit: String,
    cull_rate: Option<String>,
}

impl TryFrom<MaterialRow> for Material {
    type Error = PersistenceError;

    fn try_from(r: MaterialRow) -> Result<Self, Self::Error> {
        Ok(Material {
            id: MaterialId(r.id),
            name: r.name,
            description: r.description,
            cost_per_supplier_unit: decimal("cost_per_supplier_unit", &r.cost_per_supplier_unit)?,
            supplier_unit_type_id: r.supplier_unit_type_id.map(UnitTypeId),
            base_unit_type_id: UnitTypeId(r.base_unit_type_id),
            quantity_in_supplier_unit: decimal(
                "quantity_in_supplier_unit",
                &r.quantity_in_supplier_unit,
            )?,
            cull_rate: opt_decimal("cull_rate", r.cull_rate)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ProductRow {
    id: i64,
    name: String,
    product_unit_type_id: i64,
    unit_labor_cost: String,
    description: Option<String>,
    image_url: Option<String>,
}

impl TryFrom<ProductRow> for Product {
    type Error = PersistenceError;

    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: ProductId(r.id),
            name: r.name,
            product_unit_type_id: UnitTypeId(r.product_unit_type_id),
            unit_labor_cost: decimal("unit_labor_cost", &r.unit_labor_cost)?,
            description: r.description,
            image_url: r.image_url,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ProductMaterialRow {
    id: i64,
    product_id: i64,
    material_id: i64,
    quantity_of_material_base_units_per_product_unit: String,
    cull_included: bool,
}

impl TryFrom<ProductMaterialRow> for ProductMaterial {
    type Error = PersistenceError;

    fn try_from(r: ProductMaterialRow) -> Result<Self, Self::Error> {
        Ok(ProductMaterial {
            id: ProductMaterialId(r.id),
            product_id: ProductId(r.product_id),
            material_id: MaterialId(r.material_id),
            quantity_of_material_base_units_per_product_unit: decimal(
                "quantity_of_material_base_units_per_product_unit",
                &r.quantity_of_material_base_units_per_product_unit,
            )?,
            cull_included: r.cull_included,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct VariationGroupRow {
    id: i64,
    product_id: i64,
    name: String,
    selection_type: String,
    is_required: bool,
}

impl TryFrom<VariationGroupRow> for VariationGroup {
    type Error = PersistenceError;

    fn try_from(r: VariationGroupRow) -> Result<Self, Self::Error> {
        Ok(VariationGroup {
            id: VariationGroupId(r.id),
            product_id: ProductId(r.product_id),
            name: r.name,
            selection_type: parse_enum("selection_type", &r.selection_type)?,
            is_required: r.is_required,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct VariationOptionRow {
    id: i64,
    variation_group_id: i64,
    name: String,
    value_description: Option<String>,
    additional_price: String,
    price_multiplier: String,
    additional_labor_cost_per_product_unit: String,
}

impl TryFrom<VariationOptionRow> for VariationOption {
    type Error = PersistenceError;

    fn try_from(r: VariationOptionRow) -> Result<Self, Self::Error> {
        Ok(VariationOption {
            id: VariationOptionId(r.id),
            variation_group_id: VariationGroupId(r.variation_group_id),
            name: r.name,
            value_description: r.value_description,
            additional_price: decimal("additional_price", &r.additional_price)?,
            price_multiplier: decimal("price_multiplier", &r.price_multiplier)?,
            additional_labor_cost_per_product_unit: decimal(
                "additional_labor_cost_per_product_unit",
                &r.additional_labor_cost_per_product_unit,
            )?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct VariationOptionMaterialRow {
    id: i64,
    variation_option_id: i64,
    material_id: i64,
    quantity_of_material_base_units_added: String,
    cull_included: bool,
}

impl TryFrom<VariationOptionMaterialRow> for VariationOptionMaterial {
    type Error = PersistenceError;

    fn try_from(r: VariationOptionMaterialRow) -> Result<Self, Self::Error> {
        Ok(VariationOptionMaterial {
            id: VariationOptionMaterialId(r.id),
            variation_option_id: VariationOptionId(r.variation_option_id),
            material_id: MaterialId(r.material_id),
            quantity_of_material_base_units_added: decimal(
                "quantity_of_material_base_units_added",
                &r.quantity_of_material_base_units_added,
            )?,
            cull_included: r.cull_included,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct QuoteConfigRow {
    id: i64,
    name: String,
    margin_rate: String,
    tax_rate: String,
    sales_commission_rate: String,
    franchise_fee_rate: String,
    additional_fixed_fees: String,
    material_cull_rate: Option<String>,
    round_up_materials: bool,
}

impl TryFrom<QuoteConfigRow> for QuoteConfig {
    type Error = PersistenceError;

    fn try_from(r: QuoteConfigRow) -> Result<Self, Self::Error> {
        Ok(QuoteConfig {
            id: QuoteConfigId(r.id),
            name: r.name,
            margin_rate: decimal("margin_rate", &r.margin_rate)?,
            tax_rate: decimal("tax_rate", &r.tax_rate)?,
            sales_commission_rate: decimal("sales_commission_rate", &r.sales_commission_rate)?,
            franchise_fee_rate: decimal("franchise_fee_rate", &r.franchise_fee_rate)?,
            additional_fixed_fees: decimal("additional_fixed_fees", &r.additional_fixed_fees)?,
            material_cull_rate: opt_decimal("material_cull_rate", r.material_cull_rate)?,
            round_up_materials: r.round_up_materials,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct QuoteRow {
    id: i64,
    name: Option<String>,
    description: Option<String>,
    quote_config_id: i64,
    status: String,
    quote_type: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<QuoteRow> for Quote {
    type Error = PersistenceError;

    fn try_from(r: QuoteRow) -> Result<Self, Self::Error> {
        Ok(Quote {
            id: QuoteId(r.id),
            name: r.name,
            description: r.description,
            quote_config_id: QuoteConfigId(r.quote_config_id),
            status: parse_enum("status", &r.status)?,
            quote_type: parse_enum("quote_type", &r.quote_type)?,
            created_at: timestamp("created_at", &r.created_at)?,
            updated_at: timestamp("updated_at", &r.updated_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct EntryRow {
    id: i64,
    quote_id: i64,
    product_id: i64,
    role: String,
    quantity_of_product_units: String,
    notes: Option<String>,
}

impl TryFrom<EntryRow> for QuoteProductEntry {
    type Error = PersistenceError;

    fn try_from(r: EntryRow) -> Result<Self, Self::Error> {
        Ok(QuoteProductEntry {
            id: EntryId(r.id),
            quote_id: QuoteId(r.quote_id),
            product_id: ProductId(r.product_id),
            role: parse_enum("role", &r.role)?,
            quantity_of_product_units: decimal(
                "quantity_of_product_units",
                &r.quantity_of_product_units,
            )?,
            notes: r.notes,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct SelectionRow {
    quote_product_entry_id: i64,
    variation_option_id: i64,
}

impl From<SelectionRow> for QuoteProductEntryVariation {
    fn from(r: SelectionRow) -> Self {
        QuoteProductEntryVariation {
            quote_product_entry_id: EntryId(r.quote_product_entry_id),
            variation_option_id: VariationOptionId(r.variation_option_id),
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CalculatedQuoteRow {
    id: i64,
    quote_id: i64,
    bill_of_materials_json: String,
    total_material_cost: String,
    total_labor_cost: String,
    cost_of_goods_sold: String,
    applied_rates_info_json: String,
    subtotal_before_tax: String,
    tax_amount: String,
    final_price: String,
    calculated_at: String,
}

impl TryFrom<CalculatedQuoteRow> for CalculatedQuote {
    type Error = PersistenceError;

    fn try_from(r: CalculatedQuoteRow) -> Result<Self, Self::Error> {
        Ok(CalculatedQuote {
            id: Some(CalculatedQuoteId(r.id)),
            quote_id: QuoteId(r.quote_id),
            bill_of_materials: serde_json::from_str(&r.bill_of_materials_json)?,
            total_material_cost: decimal("total_material_cost", &r.total_material_cost)?,
            total_labor_cost: decimal("total_labor_cost", &r.total_labor_cost)?,
            cost_of_goods_sold: decimal("cost_of_goods_sold", &r.cost_of_goods_sold)?,
            applied_rates_info: serde_json::from_str(&r.applied_rates_info_json)?,
            subtotal_before_tax: decimal("subtotal_before_tax", &r.subtotal_before_tax)?,
            tax_amount: decimal("tax_amount", &r.tax_amount)?,
            final_price: decimal("final_price", &r.final_price)?,
            calculated_at: timestamp("calculated_at", &r.calculated_at)?,
        })
    }
}

/// Collect rows into domain values, failing on the first bad row.
pub(crate) fn convert<R, T>(rows: Vec<R>) -> Result<Vec<T>, PersistenceError>
where
    T: TryFrom<R, Error = PersistenceError>,
{
    rows.into_iter().map(T::try_from).collect()
}
