//! Quote assembly: resolve each product entry against the catalog.

use crate::EngineError;
use cpq_core::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Materialized entries of a quote grouped by role.
///
/// A quote has at most one MAIN and one SECONDARY entry; inserting a second
/// one fails, so later stages never see duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuoteLines {
    pub main: Option<MaterializedProductEntry>,
    pub secondary: Option<MaterializedProductEntry>,
    /// ADDITIONAL and DEFAULT entries in entry order.
    pub additional: Vec<MaterializedProductEntry>,
}

impl QuoteLines {
    pub fn insert(&mut self, entry: MaterializedProductEntry) -> Result<(), EngineError> {
        let slot = match entry.entry.role {
            ProductRole::Main => &mut self.main,
            ProductRole::Secondary => &mut self.secondary,
            ProductRole::Additional | ProductRole::Default => {
                self.additional.push(entry);
                return Ok(());
            }
        };
        if let Some(existing) = slot.as_ref() {
            return Err(EngineError::InvalidCatalog(format!(
                "quote {} has more than one {} entry ({} and {})",
                entry.entry.quote_id, entry.entry.role, existing.entry.id, entry.entry.id
            )));
        }
        *slot = Some(entry);
        Ok(())
    }

    /// Main, then secondary, then the rest.
    pub fn iter(&self) -> impl Iterator<Item = &MaterializedProductEntry> {
        self.main
            .iter()
            .chain(self.secondary.iter())
            .chain(self.additional.iter())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_entries(self) -> Vec<MaterializedProductEntry> {
        self.main
            .into_iter()
            .chain(self.secondary)
            .chain(self.additional)
            .collect()
    }
}

fn resolve_usage<S: CatalogSource + ?Sized>(
    source: &S,
    usage_source: UsageSource,
    material_id: MaterialId,
    quantity_per_product_unit: rust_decimal::Decimal,
    cull_included: bool,
) -> Result<MaterialUsage, EngineError> {
    let material = source.material(material_id)?;
    validate_material(&material)?;
    validate_usage(&material, cull_included)?;
    let unit = source.unit_type(material.base_unit_type_id)?;
    if let Some(supplier) = material.supplier_unit_type_id {
        source.unit_type(supplier)?;
    }
    Ok(MaterialUsage {
        source: usage_source,
        material,
        unit_name: unit.name,
        quantity_per_product_unit,
        cull_included,
    })
}

/// Resolve one entry: product, selected options and every material usage.
pub fn materialize_entry<S: CatalogSource + ?Sized>(
    source: &S,
    entry: &QuoteProductEntry,
) -> Result<MaterializedProductEntry, EngineError> {
    validate_entry(entry)?;
    let product = source.product(entry.product_id)?;
    validate_product(&product)?;

    let selected_options = source.selected_options(entry.id)?;
    let mut chosen: BTreeMap<VariationGroupId, usize> = BTreeMap::new();
    for option in &selected_options {
        validate_option(option)?;
        let group = source.variation_group(option.variation_group_id)?;
        if group.product_id != product.id {
            return Err(EngineError::InvalidCatalog(format!(
                "entry {}: option {} belongs to product {}, not {}",
                entry.id, option.id, group.product_id, product.id
            )));
        }
        let count = chosen.entry(group.id).or_default();
        *count += 1;
        if group.selection_type == SelectionType::SingleChoice && *count > 1 {
            return Err(EngineError::InvalidCatalog(format!(
                "entry {}: more than one option selected in single-choice group '{}'",
                entry.id, group.name
            )));
        }
    }
    for group in source.variation_groups(product.id)? {
        if group.is_required && !chosen.contains_key(&group.id) {
            return Err(EngineError::InvalidCatalog(format!(
                "entry {}: required group '{}' has no selection",
                entry.id, group.name
            )));
        }
    }

    let base_materials = source
        .product_materials(product.id)?
        .into_iter()
        .map(|pm| {
            resolve_usage(
                source,
                UsageSource::Base,
                pm.material_id,
                pm.quantity_of_material_base_units_per_product_unit,
                pm.cull_included,
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut variation_materials = Vec::new();
    for option in &selected_options {
        for vm in source.option_materials(option.id)? {
            variation_materials.push(resolve_usage(
                source,
                UsageSource::Option(option.id),
                vm.material_id,
                vm.quantity_of_material_base_units_added,
                vm.cull_included,
            )?);
        }
    }

    debug!(
        entry = %entry.id,
        product = %product.name,
        options = selected_options.len(),
        base = base_materials.len(),
        variation = variation_materials.len(),
        "entry materialized"
    );
    Ok(MaterializedProductEntry {
        entry: entry.clone(),
        quantity: entry.quantity_of_product_units,
        product,
        selected_options,
        base_materials,
        variation_materials,
    })
}

/// Materialize every entry of `quote`.
pub fn assemble_quote<S: CatalogSource + ?Sized>(
    source: &S,
    quote: &Quote,
) -> Result<QuoteLines, EngineError> {
    let mut lines = QuoteLines::default();
    for entry in source.product_entries(quote.id)? {
        lines.insert(materialize_entry(source, &entry)?)?;
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn reference_entry_resolves_base_and_option_materials() {
        let catalog = InMemoryCatalog::new(reference_scenario().catalog);
        let quote = catalog.quote(QuoteId(1)).unwrap();
        let lines = assemble_quote(&catalog, &quote).unwrap();
        assert_eq!(lines.len(), 1);
        let main = lines.main.as_ref().unwrap();
        assert_eq!(main.product.name, "Postmaster Horizontal");
        assert_eq!(main.quantity, dec("100"));
        assert_eq!(main.selected_options.len(), 7);
        assert_eq!(main.base_materials.len(), 5);
        // Board-on-Board adds stained pickets.
        assert_eq!(main.variation_materials.len(), 1);
        assert!(main.variation_materials[0].cull_included);
        assert_eq!(main.base_materials[2].unit_name, "each");
    }

    #[test]
    fn second_main_entry_rejected() {
        let mut data = reference_scenario().catalog;
        let mut second = data.product_entries[0].clone();
        second.id = EntryId(2);
        data.product_entries.push(second);
        for option in [1, 3, 5, 7, 9, 11, 13] {
            data.entry_variations.push(QuoteProductEntryVariation {
                quote_product_entry_id: EntryId(2),
                variation_option_id: VariationOptionId(option),
            });
        }
        let catalog = InMemoryCatalog::new(data);
        let quote = catalog.quote(QuoteId(1)).unwrap();
        let err = assemble_quote(&catalog, &quote).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidCatalog);
        assert!(err.to_string().contains("more than one MAIN"));
    }

    #[test]
    fn additional_entries_keep_entry_order() {
        let mut lines = QuoteLines::default();
        let data = reference_scenario().catalog;
        let catalog = InMemoryCatalog::new(data.clone());
        let base = materialize_entry(&catalog, &data.product_entries[0]).unwrap();
        for (id, role) in [(3, ProductRole::Additional), (4, ProductRole::Default)] {
            let mut e = base.clone();
            e.entry.id = EntryId(id);
            e.entry.role = role;
            lines.insert(e).unwrap();
        }
        lines.insert(base).unwrap();
        let ids: Vec<_> = lines.iter().map(|e| e.entry.id.0).collect();
        assert_eq!(ids, vec![1, 3, 4]);
    }

    #[test]
    fn two_choices_in_single_choice_group_rejected() {
        let mut data = reference_scenario().catalog;
        // Job Lot is already selected; add Standard from the same group.
        data.entry_variations.push(QuoteProductEntryVariation {
            quote_product_entry_id: EntryId(1),
            variation_option_id: VariationOptionId(4),
        });
        let catalog = InMemoryCatalog::new(data);
        let err = materialize_entry(&catalog, &catalog.product_entries(QuoteId(1)).unwrap()[0])
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidCatalog);
        assert!(err.to_string().contains("Order Type"));
    }

    #[test]
    fn missing_required_selection_rejected() {
        let mut data = reference_scenario().catalog;
        data.entry_variations
            .retain(|v| v.variation_option_id != VariationOptionId(13));
        let catalog = InMemoryCatalog::new(data);
        let entry = catalog.product_entries(QuoteId(1)).unwrap()[0].clone();
        let err = materialize_entry(&catalog, &entry).unwrap_err();
        assert!(err.to_string().contains("required group 'Height'"));
    }

    #[test]
    fn option_of_other_product_rejected() {
        let mut data = reference_scenario().catalog;
        let mut gate = data.products[0].clone();
        gate.id = ProductId(2);
        gate.name = "Walk Gate".into();
        data.products.push(gate);
        data.variation_groups.push(VariationGroup {
            id: VariationGroupId(99),
            product_id: ProductId(2),
            name: "Latch".into(),
            selection_type: SelectionType::SingleChoice,
            is_required: false,
        });
        let mut latch = data.variation_options[0].clone();
        latch.id = VariationOptionId(99);
        latch.variation_group_id = VariationGroupId(99);
        data.variation_options.push(latch);
        data.entry_variations.push(QuoteProductEntryVariation {
            quote_product_entry_id: EntryId(1),
            variation_option_id: VariationOptionId(99),
        });
        let catalog = InMemoryCatalog::new(data);
        let entry = catalog.product_entries(QuoteId(1)).unwrap()[0].clone();
        let err = materialize_entry(&catalog, &entry).unwrap_err();
        assert!(err.to_string().contains("belongs to product 2"));
    }

    #[test]
    fn missing_material_is_not_found() {
        let mut data = reference_scenario().catalog;
        data.materials.retain(|m| m.id != MaterialId(1));
        let catalog = InMemoryCatalog::new(data);
        let entry = catalog.product_entries(QuoteId(1)).unwrap()[0].clone();
        let err = materialize_entry(&catalog, &entry).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
        assert_eq!(err.to_string(), "material 1 not found");
    }

    #[test]
    fn cull_applied_twice_rejected() {
        let mut data = reference_scenario().catalog;
        // Stained pickets are authored with wastage folded in.
        let picket = data
            .materials
            .iter_mut()
            .find(|m| m.name == "Stained Picket")
            .unwrap();
        picket.cull_rate = Some(dec("0.05"));
        let catalog = InMemoryCatalog::new(data);
        let entry = catalog.product_entries(QuoteId(1)).unwrap()[0].clone();
        let err = materialize_entry(&catalog, &entry).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidCatalog);
    }
}
