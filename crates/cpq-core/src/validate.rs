//! Validation helpers for catalog and quote invariants.

use crate::catalog::CatalogData;
use crate::ids::*;
use crate::model::{Material, Product, SelectionType, VariationOption};
use crate::quote::{QuoteProductEntry, QuoteStatus};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Validation errors for domain invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Supplier units must contain a positive number of base units.
    #[error("material {0}: quantity_in_supplier_unit must be > 0")]
    NonPositiveSupplierQuantity(MaterialId),
    /// Price or cost must be non-negative.
    #[error("negative monetary value: {0}")]
    NegativeMoney(String),
    /// Cull rate must be within [0, 1).
    #[error("material {0}: cull rate must be within [0, 1)")]
    InvalidCullRate(MaterialId),
    /// A pre-inflated coefficient used with a material that also has a cull rate.
    #[error("material {0}: cull_included coefficient combined with a material cull rate")]
    CullAppliedTwice(MaterialId),
    /// Product quantities cannot be negative.
    #[error("entry {0}: quantity must be >= 0")]
    NegativeQuantity(EntryId),
    /// Status change not allowed by the quote lifecycle.
    #[error("cannot move quote from {from} to {to}")]
    InvalidTransition { from: QuoteStatus, to: QuoteStatus },
    /// Two records of the same kind share an id.
    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: i64 },
    /// A record points at something that does not exist.
    #[error("unknown {kind} {id}")]
    UnknownReference { kind: &'static str, id: i64 },
    /// The same option is selected twice on one entry.
    #[error("entry {entry}: option {option} selected more than once")]
    DuplicateSelection {
        entry: EntryId,
        option: VariationOptionId,
    },
    /// Two options of a single-choice group are selected on one entry.
    #[error("entry {entry}: more than one option selected in single-choice group {group}")]
    SingleChoiceConflict {
        entry: EntryId,
        group: VariationGroupId,
    },
}

/// Validate a material.
pub fn validate_material(m: &Material) -> Result<(), ValidationError> {
    if m.quantity_in_supplier_unit <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveSupplierQuantity(m.id));
    }
    if m.cost_per_supplier_unit < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney(format!("material {} cost", m.id)));
    }
    if let Some(rate) = m.cull_rate {
        if rate < Decimal::ZERO || rate >= Decimal::ONE {
            return Err(ValidationError::InvalidCullRate(m.id));
        }
    }
    Ok(())
}

/// Validate a product.
pub fn validate_product(p: &Product) -> Result<(), ValidationError> {
    if p.unit_labor_cost < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney(format!(
            "product {} labor cost",
            p.id
        )));
    }
    Ok(())
}

/// Validate a variation option. Labor surcharges add cost and may not be
/// negative.
pub fn validate_option(o: &VariationOption) -> Result<(), ValidationError> {
    if o.additional_labor_cost_per_product_unit < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney(format!(
            "variation option {} labor surcharge",
            o.id
        )));
    }
    Ok(())
}

/// A coefficient is either pre-inflated by the catalog author or inflated
/// by the material's cull rate, never both.
pub fn validate_usage(material: &Material, cull_included: bool) -> Result<(), ValidationError> {
    if cull_included && material.effective_cull_rate().is_some() {
        return Err(ValidationError::CullAppliedTwice(material.id));
    }
    Ok(())
}

/// Validate a quote product entry.
pub fn validate_entry(e: &QuoteProductEntry) -> Result<(), ValidationError> {
    if e.quantity_of_product_units < Decimal::ZERO {
        return Err(ValidationError::NegativeQuantity(e.id));
    }
    Ok(())
}

fn unique_ids<'a, I>(kind: &'static str, ids: I) -> Result<BTreeSet<i64>, ValidationError>
where
    I: IntoIterator<Item = &'a i64>,
{
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(*id) {
            return Err(ValidationError::DuplicateId { kind, id: *id });
        }
    }
    Ok(seen)
}

fn require(kind: &'static str, known: &BTreeSet<i64>, id: i64) -> Result<(), ValidationError> {
    if known.contains(&id) {
        Ok(())
    } else {
        Err(ValidationError::UnknownReference { kind, id })
    }
}

/// Validate a whole catalog document, including cross-references.
pub fn validate_catalog(data: &CatalogData) -> Result<(), ValidationError> {
    let units = unique_ids("unit type", data.unit_types.iter().map(|u| &u.id.0))?;
    let materials: BTreeMap<i64, &Material> =
        data.materials.iter().map(|m| (m.id.0, m)).collect();
    unique_ids("material", data.materials.iter().map(|m| &m.id.0))?;
    let products = unique_ids("product", data.products.iter().map(|p| &p.id.0))?;
    let groups = unique_ids("variation group", data.variation_groups.iter().map(|g| &g.id.0))?;
    let options = unique_ids(
        "variation option",
        data.variation_options.iter().map(|o| &o.id.0),
    )?;
    let configs = unique_ids("quote config", data.quote_configs.iter().map(|c| &c.id.0))?;
    let quotes = unique_ids("quote", data.quotes.iter().map(|q| &q.id.0))?;
    let entries = unique_ids("entry", data.product_entries.iter().map(|e| &e.id.0))?;
    unique_ids(
        "product material",
        data.product_materials.iter().map(|pm| &pm.id.0),
    )?;
    unique_ids(
        "variation option material",
        data.variation_option_materials.iter().map(|vm| &vm.id.0),
    )?;

    for m in &data.materials {
        validate_material(m)?;
        require("unit type", &units, m.base_unit_type_id.0)?;
        if let Some(supplier) = m.supplier_unit_type_id {
            require("unit type", &units, supplier.0)?;
        }
    }
    for p in &data.products {
        validate_product(p)?;
        require("unit type", &units, p.product_unit_type_id.0)?;
    }
    let material = |id: MaterialId| {
        materials
            .get(&id.0)
            .copied()
            .ok_or(ValidationError::UnknownReference {
                kind: "material",
                id: id.0,
            })
    };
    for pm in &data.product_materials {
        require("product", &products, pm.product_id.0)?;
        validate_usage(material(pm.material_id)?, pm.cull_included)?;
    }
    for g in &data.variation_groups {
        require("product", &products, g.product_id.0)?;
    }
    for o in &data.variation_options {
        validate_option(o)?;
        require("variation group", &groups, o.variation_group_id.0)?;
    }
    for vm in &data.variation_option_materials {
        require("variation option", &options, vm.variation_option_id.0)?;
        validate_usage(material(vm.material_id)?, vm.cull_included)?;
    }
    for q in &data.quotes {
        require("quote config", &configs, q.quote_config_id.0)?;
    }
    for e in &data.product_entries {
        validate_entry(e)?;
        require("quote", &quotes, e.quote_id.0)?;
        require("product", &products, e.product_id.0)?;
    }
    let group_of: BTreeMap<VariationOptionId, VariationGroupId> = data
        .variation_options
        .iter()
        .map(|o| (o.id, o.variation_group_id))
        .collect();
    let single_choice: BTreeSet<VariationGroupId> = data
        .variation_groups
        .iter()
        .filter(|g| g.selection_type == SelectionType::SingleChoice)
        .map(|g| g.id)
        .collect();
    let mut selected = BTreeSet::new();
    let mut chosen_groups = BTreeSet::new();
    for s in &data.entry_variations {
        let (entry, option) = (s.quote_product_entry_id, s.variation_option_id);
        require("entry", &entries, entry.0)?;
        require("variation option", &options, option.0)?;
        if !selected.insert((entry, option)) {
            return Err(ValidationError::DuplicateSelection { entry, option });
        }
        if let Some(&group) = group_of.get(&option) {
            if single_choice.contains(&group) && !chosen_groups.insert((entry, group)) {
                return Err(ValidationError::SingleChoiceConflict { entry, group });
            }
        }
    }
    Ok(())
}
