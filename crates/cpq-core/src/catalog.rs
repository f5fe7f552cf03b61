//! Read access to catalog and quote records.
//!
//! [`CatalogSource`] is the seam between the pricing engine and whatever
//! stores the records. [`InMemoryCatalog`] implements it over a
//! [`CatalogData`] document and doubles as the snapshot type loaded from the
//! database for a single calculation.

use crate::ids::*;
use crate::model::*;
use crate::quote::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Lookup failures.
#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
}

impl CatalogError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        CatalogError::NotFound { entity, id }
    }
}

/// Data operations consumed by quote assembly.
pub trait CatalogSource {
    fn quote(&self, id: QuoteId) -> Result<Quote, CatalogError>;
    /// Entries of a quote ordered by id.
    fn product_entries(&self, quote_id: QuoteId) -> Result<Vec<QuoteProductEntry>, CatalogError>;
    /// Options selected on an entry ordered by id.
    fn selected_options(&self, entry_id: EntryId) -> Result<Vec<VariationOption>, CatalogError>;
    fn product(&self, id: ProductId) -> Result<Product, CatalogError>;
    fn product_materials(&self, product_id: ProductId)
        -> Result<Vec<ProductMaterial>, CatalogError>;
    fn variation_group(&self, id: VariationGroupId) -> Result<VariationGroup, CatalogError>;
    fn variation_groups(&self, product_id: ProductId) -> Result<Vec<VariationGroup>, CatalogError>;
    fn option_materials(
        &self,
        option_id: VariationOptionId,
    ) -> Result<Vec<VariationOptionMaterial>, CatalogError>;
    fn material(&self, id: MaterialId) -> Result<Material, CatalogError>;
    fn unit_type(&self, id: UnitTypeId) -> Result<UnitType, CatalogError>;
    fn quote_config(&self, id: QuoteConfigId) -> Result<QuoteConfig, CatalogError>;
}

/// Flat, serializable form of a catalog plus the quotes that reference it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogData {
    pub unit_types: Vec<UnitType>,
    pub materials: Vec<Material>,
    pub products: Vec<Product>,
    pub product_materials: Vec<ProductMaterial>,
    pub variation_groups: Vec<VariationGroup>,
    pub variation_options: Vec<VariationOption>,
    pub variation_option_materials: Vec<VariationOptionMaterial>,
    pub quote_configs: Vec<QuoteConfig>,
    pub quotes: Vec<Quote>,
    pub product_entries: Vec<QuoteProductEntry>,
    pub entry_variations: Vec<QuoteProductEntryVariation>,
}

/// Indexed, read-only view over a [`CatalogData`] document.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCatalog {
    unit_types: BTreeMap<UnitTypeId, UnitType>,
    materials: BTreeMap<MaterialId, Material>,
    products: BTreeMap<ProductId, Product>,
    product_materials: BTreeMap<ProductId, Vec<ProductMaterial>>,
    groups: BTreeMap<VariationGroupId, VariationGroup>,
    options: BTreeMap<VariationOptionId, VariationOption>,
    option_materials: BTreeMap<VariationOptionId, Vec<VariationOptionMaterial>>,
    configs: BTreeMap<QuoteConfigId, QuoteConfig>,
    quotes: BTreeMap<QuoteId, Quote>,
    entries: BTreeMap<EntryId, QuoteProductEntry>,
    selections: BTreeMap<EntryId, Vec<VariationOptionId>>,
}

fn by_id<K: Ord, V>(items: Vec<V>, key: impl Fn(&V) -> K) -> BTreeMap<K, V> {
    items.into_iter().map(|v| (key(&v), v)).collect()
}

fn grouped<K: Ord, V>(
    items: Vec<V>,
    key: impl Fn(&V) -> K,
    order: impl Fn(&V) -> i64,
) -> BTreeMap<K, Vec<V>> {
    let mut out: BTreeMap<K, Vec<V>> = BTreeMap::new();
    for v in items {
        out.entry(key(&v)).or_default().push(v);
    }
    for list in out.values_mut() {
        list.sort_by_key(|v| order(v));
    }
    out
}

impl InMemoryCatalog {
    pub fn new(data: CatalogData) -> Self {
        let mut selections: BTreeMap<EntryId, Vec<VariationOptionId>> = BTreeMap::new();
        for s in data.entry_variations {
            let list = selections.entry(s.quote_product_entry_id).or_default();
            if !list.contains(&s.variation_option_id) {
                list.push(s.variation_option_id);
            }
        }
        for list in selections.values_mut() {
            list.sort();
        }
        Self {
            unit_types: by_id(data.unit_types, |u| u.id),
            materials: by_id(data.materials, |m| m.id),
            products: by_id(data.products, |p| p.id),
            product_materials: grouped(data.product_materials, |pm| pm.product_id, |pm| pm.id.0),
            groups: by_id(data.variation_groups, |g| g.id),
            options: by_id(data.variation_options, |o| o.id),
            option_materials: grouped(
                data.variation_option_materials,
                |vm| vm.variation_option_id,
                |vm| vm.id.0,
            ),
            configs: by_id(data.quote_configs, |c| c.id),
            quotes: by_id(data.quotes, |q| q.id),
            entries: by_id(data.product_entries, |e| e.id),
            selections,
        }
    }

    pub fn quote_count(&self) -> usize {
        self.quotes.len()
    }
}

fn lookup<K: Ord + Copy + Into<i64>, V: Clone>(
    map: &BTreeMap<K, V>,
    entity: &'static str,
    id: K,
) -> Result<V, CatalogError> {
    map.get(&id)
        .cloned()
        .ok_or_else(|| CatalogError::not_found(entity, id.into()))
}

impl CatalogSource for InMemoryCatalog {
    fn quote(&self, id: QuoteId) -> Result<Quote, CatalogError> {
        lookup(&self.quotes, "quote", id)
    }

    fn product_entries(&self, quote_id: QuoteId) -> Result<Vec<QuoteProductEntry>, CatalogError> {
        if !self.quotes.contains_key(&quote_id) {
            return Err(CatalogError::not_found("quote", quote_id.0));
        }
        Ok(self
            .entries
            .values()
            .filter(|e| e.quote_id == quote_id)
            .cloned()
            .collect())
    }

    fn selected_options(&self, entry_id: EntryId) -> Result<Vec<VariationOption>, CatalogError> {
        if !self.entries.contains_key(&entry_id) {
            return Err(CatalogError::not_found("entry", entry_id.0));
        }
        self.selections
            .get(&entry_id)
            .map(|ids| ids.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|id| lookup(&self.options, "variation option", *id))
            .collect()
    }

    fn product(&self, id: ProductId) -> Result<Product, CatalogError> {
        lookup(&self.products, "product", id)
    }

    fn product_materials(
        &self,
        product_id: ProductId,
    ) -> Result<Vec<ProductMaterial>, CatalogError> {
        if !self.products.contains_key(&product_id) {
            return Err(CatalogError::not_found("product", product_id.0));
        }
        Ok(self
            .product_materials
            .get(&product_id)
            .cloned()
            .unwrap_or_default())
    }

    fn variation_group(&self, id: VariationGroupId) -> Result<VariationGroup, CatalogError> {
        lookup(&self.groups, "variation group", id)
    }

    fn variation_groups(&self, product_id: ProductId) -> Result<Vec<VariationGroup>, CatalogError> {
        if !self.products.contains_key(&product_id) {
            return Err(CatalogError::not_found("product", product_id.0));
        }
        Ok(self
            .groups
            .values()
            .filter(|g| g.product_id == product_id)
            .cloned()
            .collect())
    }

    fn option_materials(
        &self,
        option_id: VariationOptionId,
    ) -> Result<Vec<VariationOptionMaterial>, CatalogError> {
        if !self.options.contains_key(&option_id) {
            return Err(CatalogError::not_found("variation option", option_id.0));
        }
        Ok(self
            .option_materials
            .get(&option_id)
            .cloned()
            .unwrap_or_default())
    }

    fn material(&self, id: MaterialId) -> Result<Material, CatalogError> {
        lookup(&self.materials, "material", id)
    }

    fn unit_type(&self, id: UnitTypeId) -> Result<UnitType, CatalogError> {
        lookup(&self.unit_types, "unit type", id)
    }

    fn quote_config(&self, id: QuoteConfigId) -> Result<QuoteConfig, CatalogError> {
        lookup(&self.configs, "quote config", id)
    }
}
