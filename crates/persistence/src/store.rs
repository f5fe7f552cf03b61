//! Quote storage over a SQLite pool.

use crate::rows::*;
use crate::{init_db, init_memory_db, PersistenceError};
use chrono::{SecondsFormat, Utc};
use cpq_core::*;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

/// Input for [`Store::create_quote`].
#[derive(Clone, Debug)]
pub struct NewQuote {
    pub name: Option<String>,
    pub description: Option<String>,
    pub quote_config_id: QuoteConfigId,
    pub quote_type: QuoteType,
}

/// Input for [`Store::add_product_entry`].
#[derive(Clone, Debug)]
pub struct NewProductEntry {
    pub product_id: ProductId,
    pub role: ProductRole,
    pub quantity_of_product_units: Decimal,
    pub notes: Option<String>,
}

/// Handle to the quote database.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

fn now_text() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

const QUOTE_COLUMNS: &str =
    "id, name, description, quote_config_id, status, quote_type, created_at, updated_at";
const ENTRY_COLUMNS: &str =
    "id, quote_id, product_id, role, quantity_of_product_units, notes";
const CALCULATED_COLUMNS: &str = "id, quote_id, bill_of_materials_json, total_material_cost, \
     total_labor_cost, cost_of_goods_sold, applied_rates_info_json, subtotal_before_tax, \
     tax_amount, final_price, calculated_at";

async fn fetch_quote(conn: &mut SqliteConnection, id: QuoteId) -> Result<Quote, PersistenceError> {
    sqlx::query_as::<_, QuoteRow>(&format!("SELECT {QUOTE_COLUMNS} FROM quotes WHERE id = ?"))
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| PersistenceError::not_found("quote", id))?
        .try_into()
}

async fn editable_quote(
    conn: &mut SqliteConnection,
    id: QuoteId,
) -> Result<Quote, PersistenceError> {
    let quote = fetch_quote(conn, id).await?;
    if !quote.status.is_editable() {
        return Err(PersistenceError::Locked {
            quote: id,
            status: quote.status,
        });
    }
    Ok(quote)
}

async fn touch_quote(conn: &mut SqliteConnection, id: QuoteId) -> Result<(), PersistenceError> {
    sqlx::query("UPDATE quotes SET updated_at = ? WHERE id = ?")
        .bind(now_text())
        .bind(id.0)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn fetch_entry(
    conn: &mut SqliteConnection,
    id: EntryId,
) -> Result<QuoteProductEntry, PersistenceError> {
    sqlx::query_as::<_, EntryRow>(&format!(
        "SELECT {ENTRY_COLUMNS} FROM quote_product_entries WHERE id = ?"
    ))
    .bind(id.0)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| PersistenceError::not_found("entry", id))?
    .try_into()
}

async fn exists(
    conn: &mut SqliteConnection,
    sql: &str,
    id: i64,
) -> Result<bool, PersistenceError> {
    let found: Option<i64> = sqlx::query_scalar(sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

async fn selected_option_ids(
    conn: &mut SqliteConnection,
    entry: EntryId,
) -> Result<Vec<VariationOptionId>, PersistenceError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT variation_option_id FROM quote_product_entry_variations \
         WHERE quote_product_entry_id = ? ORDER BY variation_option_id",
    )
    .bind(entry.0)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids.into_iter().map(VariationOptionId).collect())
}

async fn load_snapshot(
    conn: &mut SqliteConnection,
    quote_id: QuoteId,
) -> Result<InMemoryCatalog, PersistenceError> {
    let quote = fetch_quote(conn, quote_id).await?;
    let config: QuoteConfig = sqlx::query_as::<_, QuoteConfigRow>(
        "SELECT id, name, margin_rate, tax_rate, sales_commission_rate, franchise_fee_rate, \
         additional_fixed_fees, material_cull_rate, round_up_materials \
         FROM quote_configs WHERE id = ?",
    )
    .bind(quote.quote_config_id.0)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| PersistenceError::not_found("quote config", quote.quote_config_id))?
    .try_into()?;
    let entries: Vec<EntryRow> = sqlx::query_as(&format!(
        "SELECT {ENTRY_COLUMNS} FROM quote_product_entries WHERE quote_id = ? ORDER BY id"
    ))
    .bind(quote_id.0)
    .fetch_all(&mut *conn)
    .await?;
    let selections: Vec<SelectionRow> = sqlx::query_as(
        "SELECT v.quote_product_entry_id, v.variation_option_id \
         FROM quote_product_entry_variations v \
         JOIN quote_product_entries e ON e.id = v.quote_product_entry_id \
         WHERE e.quote_id = ? ORDER BY v.id",
    )
    .bind(quote_id.0)
    .fetch_all(&mut *conn)
    .await?;
    let unit_types: Vec<UnitTypeRow> =
        sqlx::query_as("SELECT id, name, category FROM unit_types ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
    let materials: Vec<MaterialRow> = sqlx::query_as(
        "SELECT id, name, description, cost_per_supplier_unit, supplier_unit_type_id, \
         base_unit_type_id, quantity_in_supplier_unit, cull_rate FROM materials ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;
    let products: Vec<ProductRow> = sqlx::query_as(
        "SELECT id, name, product_unit_type_id, unit_labor_cost, description, image_url \
         FROM products ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;
    let product_materials: Vec<ProductMaterialRow> = sqlx::query_as(
        "SELECT id, product_id, material_id, \
         quantity_of_material_base_units_per_product_unit, cull_included \
         FROM product_materials ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;
    let groups: Vec<VariationGroupRow> = sqlx::query_as(
        "SELECT id, product_id, name, selection_type, is_required \
         FROM variation_groups ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;
    let options: Vec<VariationOptionRow> = sqlx::query_as(
        "SELECT id, variation_group_id, name, value_description, additional_price, \
         price_multiplier, additional_labor_cost_per_product_unit \
         FROM variation_options ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;
    let option_materials: Vec<VariationOptionMaterialRow> = sqlx::query_as(
        "SELECT id, variation_option_id, material_id, \
         quantity_of_material_base_units_added, cull_included \
         FROM variation_option_materials ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await?;

    let data = CatalogData {
        unit_types: unit_types.into_iter().map(UnitType::from).collect(),
        materials: convert(materials)?,
        products: convert(products)?,
        product_materials: convert(product_materials)?,
        variation_groups: convert(groups)?,
        variation_options: convert(options)?,
        variation_option_materials: convert(option_materials)?,
        quote_configs: vec![config],
        quotes: vec![quote],
        product_entries: convert(entries)?,
        entry_variations: selections
            .into_iter()
            .map(QuoteProductEntryVariation::from)
            .collect(),
    };
    debug!(
        quote = %quote_id,
        entries = data.product_entries.len(),
        selections = data.entry_variations.len(),
        "quote snapshot loaded"
    );
    Ok(InMemoryCatalog::new(data))
}

async fn insert_calculated(
    conn: &mut SqliteConnection,
    calc: &CalculatedQuote,
) -> Result<CalculatedQuoteId, PersistenceError> {
    let bom = serde_json::to_string(&calc.bill_of_materials)?;
    let rates = serde_json::to_string(&calc.applied_rates_info)?;
    let id = sqlx::query(
        "INSERT INTO calculated_quotes (quote_id, bill_of_materials_json, \
         total_material_cost, total_labor_cost, cost_of_goods_sold, applied_rates_info_json, \
         subtotal_before_tax, tax_amount, final_price, calculated_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(calc.quote_id.0)
    .bind(bom)
    .bind(calc.total_material_cost.to_string())
    .bind(calc.total_labor_cost.to_string())
    .bind(calc.cost_of_goods_sold.to_string())
    .bind(rates)
    .bind(calc.subtotal_before_tax.to_string())
    .bind(calc.tax_amount.to_string())
    .bind(calc.final_price.to_string())
    .bind(calc.calculated_at.to_rfc3339_opts(SecondsFormat::Micros, true))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    info!(quote = %calc.quote_id, calculated = id, final_price = %calc.final_price, "calculation stored");
    Ok(CalculatedQuoteId(id))
}

async fn set_status(
    conn: &mut SqliteConnection,
    id: QuoteId,
    next: QuoteStatus,
) -> Result<Quote, PersistenceError> {
    let quote = fetch_quote(conn, id).await?;
    let status = quote.status.transition_to(next)?;
    sqlx::query("UPDATE quotes SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(now_text())
        .bind(id.0)
        .execute(&mut *conn)
        .await?;
    info!(quote = %id, from = %quote.status, to = %status, "quote status changed");
    fetch_quote(conn, id).await
}

impl Store {
    /// Open the database at `url`, creating it and running migrations.
    pub async fn connect(url: &str) -> Result<Self, PersistenceError> {
        Ok(Self {
            pool: init_db(url).await?,
        })
    }

    /// Fresh in-memory database.
    pub async fn in_memory() -> Result<Self, PersistenceError> {
        Ok(Self {
            pool: init_memory_db().await?,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a catalog document. Rows whose id already exists are kept as stored.
    pub async fn seed(&self, data: &CatalogData) -> Result<(), PersistenceError> {
        validate_catalog(data)?;
        let mut tx = self.pool.begin().await?;
        for u in &data.unit_types {
            sqlx::query("INSERT OR IGNORE INTO unit_types (id, name, category) VALUES (?, ?, ?)")
                .bind(u.id.0)
                .bind(&u.name)
                .bind(&u.category)
                .execute(&mut *tx)
                .await?;
        }
        for m in &data.materials {
            sqlx::query(
                "INSERT OR IGNORE INTO materials (id, name, description, cost_per_supplier_unit, \
                 supplier_unit_type_id, base_unit_type_id, quantity_in_supplier_unit, cull_rate) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(m.id.0)
            .bind(&m.name)
            .bind(&m.description)
            .bind(m.cost_per_supplier_unit.to_string())
            .bind(m.supplier_unit_type_id.map(|u| u.0))
            .bind(m.base_unit_type_id.0)
            .bind(m.quantity_in_supplier_unit.to_string())
            .bind(m.cull_rate.map(|r| r.to_string()))
            .execute(&mut *tx)
            .await?;
        }
        for p in &data.products {
            sqlx::query(
                "INSERT OR IGNORE INTO products (id, name, product_unit_type_id, unit_labor_cost, \
                 description, image_url) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(p.id.0)
            .bind(&p.name)
            .bind(p.product_unit_type_id.0)
            .bind(p.unit_labor_cost.to_string())
            .bind(&p.description)
            .bind(&p.image_url)
            .execute(&mut *tx)
            .await?;
        }
        for pm in &data.product_materials {
            sqlx::query(
                "INSERT OR IGNORE INTO product_materials (id, product_id, material_id, \
                 quantity_of_material_base_units_per_product_unit, cull_included) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(pm.id.0)
            .bind(pm.product_id.0)
            .bind(pm.material_id.0)
            .bind(pm.quantity_of_material_base_units_per_product_unit.to_string())
            .bind(pm.cull_included)
            .execute(&mut *tx)
            .await?;
        }
        for g in &data.variation_groups {
            sqlx::query(
                "INSERT OR IGNORE INTO variation_groups (id, product_id, name, selection_type, \
                 is_required) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(g.id.0)
            .bind(g.product_id.0)
            .bind(&g.name)
            .bind(g.selection_type.as_str())
            .bind(g.is_required)
            .execute(&mut *tx)
            .await?;
        }
        for o in &data.variation_options {
            sqlx::query(
                "INSERT OR IGNORE INTO variation_options (id, variation_group_id, name, \
                 value_description, additional_price, price_multiplier, \
                 additional_labor_cost_per_product_unit) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(o.id.0)
            .bind(o.variation_group_id.0)
            .bind(&o.name)
            .bind(&o.value_description)
            .bind(o.additional_price.to_string())
            .bind(o.price_multiplier.to_string())
            .bind(o.additional_labor_cost_per_product_unit.to_string())
            .execute(&mut *tx)
            .await?;
        }
        for vm in &data.variation_option_materials {
            sqlx::query(
                "INSERT OR IGNORE INTO variation_option_materials (id, variation_option_id, \
                 material_id, quantity_of_material_base_units_added, cull_included) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(vm.id.0)
            .bind(vm.variation_option_id.0)
            .bind(vm.material_id.0)
            .bind(vm.quantity_of_material_base_units_added.to_string())
            .bind(vm.cull_included)
            .execute(&mut *tx)
            .await?;
        }
        for c in &data.quote_configs {
            sqlx::query(
                "INSERT OR IGNORE INTO quote_configs (id, name, margin_rate, tax_rate, \
                 sales_commission_rate, franchise_fee_rate, additional_fixed_fees, \
                 material_cull_rate, round_up_materials) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(c.id.0)
            .bind(&c.name)
            .bind(c.margin_rate.to_string())
            .bind(c.tax_rate.to_string())
            .bind(c.sales_commission_rate.to_string())
            .bind(c.franchise_fee_rate.to_string())
            .bind(c.additional_fixed_fees.to_string())
            .bind(c.material_cull_rate.map(|r| r.to_string()))
            .bind(c.round_up_materials)
            .execute(&mut *tx)
            .await?;
        }
        for q in &data.quotes {
            sqlx::query(&format!(
                "INSERT OR IGNORE INTO quotes ({QUOTE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
            ))
            .bind(q.id.0)
            .bind(&q.name)
            .bind(&q.description)
            .bind(q.quote_config_id.0)
            .bind(q.status.as_str())
            .bind(q.quote_type.as_str())
            .bind(q.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .bind(q.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .execute(&mut *tx)
            .await?;
        }
        for e in &data.product_entries {
            sqlx::query(&format!(
                "INSERT OR IGNORE INTO quote_product_entries ({ENTRY_COLUMNS}) \
                 VALUES (?, ?, ?, ?, ?, ?)"
            ))
            .bind(e.id.0)
            .bind(e.quote_id.0)
            .bind(e.product_id.0)
            .bind(e.role.as_str())
            .bind(e.quantity_of_product_units.to_string())
            .bind(&e.notes)
            .execute(&mut *tx)
            .await?;
        }
        for s in &data.entry_variations {
            sqlx::query(
                "INSERT OR IGNORE INTO quote_product_entry_variations \
                 (quote_product_entry_id, variation_option_id) VALUES (?, ?)",
            )
            .bind(s.quote_product_entry_id.0)
            .bind(s.variation_option_id.0)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(
            materials = data.materials.len(),
            products = data.products.len(),
            quotes = data.quotes.len(),
            "catalog seeded"
        );
        Ok(())
    }

    pub async fn quote(&self, id: QuoteId) -> Result<Quote, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        fetch_quote(&mut conn, id).await
    }

    /// Create a draft quote.
    pub async fn create_quote(&self, new: NewQuote) -> Result<Quote, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        if !exists(
            &mut tx,
            "SELECT id FROM quote_configs WHERE id = ?",
            new.quote_config_id.0,
        )
        .await?
        {
            return Err(PersistenceError::not_found(
                "quote config",
                new.quote_config_id,
            ));
        }
        let now = now_text();
        let id = sqlx::query(
            "INSERT INTO quotes (name, description, quote_config_id, status, quote_type, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.quote_config_id.0)
        .bind(QuoteStatus::Draft.as_str())
        .bind(new.quote_type.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        let quote = fetch_quote(&mut tx, QuoteId(id)).await?;
        tx.commit().await?;
        info!(quote = id, "quote created");
        Ok(quote)
    }

    /// Add a product to a draft quote. MAIN and SECONDARY are limited to one each.
    pub async fn add_product_entry(
        &self,
        quote_id: QuoteId,
        new: NewProductEntry,
    ) -> Result<QuoteProductEntry, PersistenceError> {
        if new.quantity_of_product_units < Decimal::ZERO {
            return Err(PersistenceError::NegativeQuantity(
                new.quantity_of_product_units,
            ));
        }
        let mut tx = self.pool.begin().await?;
        editable_quote(&mut tx, quote_id).await?;
        if !exists(
            &mut tx,
            "SELECT id FROM products WHERE id = ?",
            new.product_id.0,
        )
        .await?
        {
            return Err(PersistenceError::not_found("product", new.product_id));
        }
        if new.role.is_unique() {
            let taken: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM quote_product_entries WHERE quote_id = ? AND role = ?",
            )
            .bind(quote_id.0)
            .bind(new.role.as_str())
            .fetch_one(&mut *tx)
            .await?;
            if taken > 0 {
                return Err(PersistenceError::RoleTaken {
                    quote: quote_id,
                    role: new.role,
                });
            }
        }
        let id = sqlx::query(
            "INSERT INTO quote_product_entries (quote_id, product_id, role, \
             quantity_of_product_units, notes) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(quote_id.0)
        .bind(new.product_id.0)
        .bind(new.role.as_str())
        .bind(new.quantity_of_product_units.to_string())
        .bind(&new.notes)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        touch_quote(&mut tx, quote_id).await?;
        let entry = fetch_entry(&mut tx, EntryId(id)).await?;
        tx.commit().await?;
        debug!(quote = %quote_id, entry = id, role = %entry.role, "entry added");
        Ok(entry)
    }

    /// Remove an entry and its selections from a draft quote.
    pub async fn remove_product_entry(&self, entry_id: EntryId) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let entry = fetch_entry(&mut tx, entry_id).await?;
        editable_quote(&mut tx, entry.quote_id).await?;
        sqlx::query("DELETE FROM quote_product_entry_variations WHERE quote_product_entry_id = ?")
            .bind(entry_id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM quote_product_entries WHERE id = ?")
            .bind(entry_id.0)
            .execute(&mut *tx)
            .await?;
        touch_quote(&mut tx, entry.quote_id).await?;
        tx.commit().await?;
        debug!(entry = %entry_id, "entry removed");
        Ok(())
    }

    /// Select an option on an entry and return the entry's selection.
    ///
    /// In a single_choice group the option replaces any other choice of that
    /// group; in a multi_choice group selecting an already selected option
    /// clears it.
    pub async fn select_variation_option(
        &self,
        entry_id: EntryId,
        option_id: VariationOptionId,
    ) -> Result<Vec<VariationOptionId>, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let entry = fetch_entry(&mut tx, entry_id).await?;
        editable_quote(&mut tx, entry.quote_id).await?;
        let option: VariationOption = sqlx::query_as::<_, VariationOptionRow>(
            "SELECT id, variation_group_id, name, value_description, additional_price, \
             price_multiplier, additional_labor_cost_per_product_unit \
             FROM variation_options WHERE id = ?",
        )
        .bind(option_id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| PersistenceError::not_found("variation option", option_id))?
        .try_into()?;
        let group: VariationGroup = sqlx::query_as::<_, VariationGroupRow>(
            "SELECT id, product_id, name, selection_type, is_required \
             FROM variation_groups WHERE id = ?",
        )
        .bind(option.variation_group_id.0)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| PersistenceError::not_found("variation group", option.variation_group_id))?
        .try_into()?;
        if group.product_id != entry.product_id {
            return Err(PersistenceError::ForeignOption {
                entry: entry_id,
                option: option_id,
            });
        }

        let already = selected_option_ids(&mut tx, entry_id)
            .await?
            .contains(&option_id);
        match group.selection_type {
            SelectionType::SingleChoice => {
                sqlx::query(
                    "DELETE FROM quote_product_entry_variations \
                     WHERE quote_product_entry_id = ? AND variation_option_id != ? \
                     AND variation_option_id IN \
                     (SELECT id FROM variation_options WHERE variation_group_id = ?)",
                )
                .bind(entry_id.0)
                .bind(option_id.0)
                .bind(group.id.0)
                .execute(&mut *tx)
                .await?;
            }
            SelectionType::MultiChoice if already => {
                sqlx::query(
                    "DELETE FROM quote_product_entry_variations \
                     WHERE quote_product_entry_id = ? AND variation_option_id = ?",
                )
                .bind(entry_id.0)
                .bind(option_id.0)
                .execute(&mut *tx)
                .await?;
            }
            SelectionType::MultiChoice => {}
        }
        let toggled_off = already && group.selection_type == SelectionType::MultiChoice;
        if !already {
            sqlx::query(
                "INSERT INTO quote_product_entry_variations \
                 (quote_product_entry_id, variation_option_id) VALUES (?, ?)",
            )
            .bind(entry_id.0)
            .bind(option_id.0)
            .execute(&mut *tx)
            .await?;
        }
        touch_quote(&mut tx, entry.quote_id).await?;
        let selection = selected_option_ids(&mut tx, entry_id).await?;
        tx.commit().await?;
        debug!(entry = %entry_id, option = %option_id, group = %group.name, toggled_off, "option selected");
        Ok(selection)
    }

    /// DRAFT -> FINAL.
    pub async fn finalize_quote(&self, id: QuoteId) -> Result<Quote, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let quote = set_status(&mut tx, id, QuoteStatus::Final).await?;
        tx.commit().await?;
        Ok(quote)
    }

    /// FINAL -> SENT.
    pub async fn mark_quote_sent(&self, id: QuoteId) -> Result<Quote, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let quote = set_status(&mut tx, id, QuoteStatus::Sent).await?;
        tx.commit().await?;
        Ok(quote)
    }

    /// Read a quote and the current catalog in one transaction.
    pub async fn load_quote_snapshot(
        &self,
        quote_id: QuoteId,
    ) -> Result<InMemoryCatalog, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        let snapshot = load_snapshot(&mut tx, quote_id).await?;
        tx.commit().await?;
        Ok(snapshot)
    }

    /// Append a calculation snapshot and return its id.
    pub async fn insert_calculated_quote(
        &self,
        calc: &CalculatedQuote,
    ) -> Result<CalculatedQuoteId, PersistenceError> {
        let mut conn = self.pool.acquire().await?;
        insert_calculated(&mut conn, calc).await
    }

    /// Load the quote snapshot, run `calculate` over it and append the
    /// result, all inside one transaction. Nothing is written when
    /// `calculate` fails, and a status change committed by another
    /// connection in between makes the write fail instead of landing.
    pub async fn record_calculation<F, E>(
        &self,
        quote_id: QuoteId,
        calculate: F,
    ) -> Result<CalculatedQuote, E>
    where
        F: FnOnce(&InMemoryCatalog) -> Result<CalculatedQuote, E>,
        E: From<PersistenceError>,
    {
        let mut tx = self.pool.begin().await.map_err(PersistenceError::from)?;
        let snapshot = load_snapshot(&mut tx, quote_id).await?;
        let mut calc = calculate(&snapshot)?;
        let id = insert_calculated(&mut tx, &calc).await?;
        tx.commit().await.map_err(PersistenceError::from)?;
        calc.id = Some(id);
        Ok(calc)
    }

    /// Most recent calculation of a quote, if any.
    pub async fn latest_calculated_quote(
        &self,
        quote_id: QuoteId,
    ) -> Result<Option<CalculatedQuote>, PersistenceError> {
        sqlx::query_as::<_, CalculatedQuoteRow>(&format!(
            "SELECT {CALCULATED_COLUMNS} FROM calculated_quotes \
             WHERE quote_id = ? ORDER BY id DESC LIMIT 1"
        ))
        .bind(quote_id.0)
        .fetch_optional(&self.pool)
        .await?
        .map(CalculatedQuote::try_from)
        .transpose()
    }

    /// Every calculation of a quote, oldest first.
    pub async fn calculated_quotes(
        &self,
        quote_id: QuoteId,
    ) -> Result<Vec<CalculatedQuote>, PersistenceError> {
        let rows: Vec<CalculatedQuoteRow> = sqlx::query_as(&format!(
            "SELECT {CALCULATED_COLUMNS} FROM calculated_quotes WHERE quote_id = ? ORDER BY id"
        ))
        .bind(quote_id.0)
        .fetch_all(&self.pool)
        .await?;
        convert(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn group(id: i64, product: i64, selection_type: SelectionType) -> VariationGroup {
        VariationGroup {
            id: VariationGroupId(id),
            product_id: ProductId(product),
            name: format!("Group {id}"),
            selection_type,
            is_required: false,
        }
    }

    fn option(id: i64, group: i64) -> VariationOption {
        VariationOption {
            id: VariationOptionId(id),
            variation_group_id: VariationGroupId(group),
            name: format!("Option {id}"),
            value_description: None,
            additional_price: Decimal::ZERO,
            price_multiplier: Decimal::ONE,
            additional_labor_cost_per_product_unit: Decimal::ZERO,
        }
    }

    fn product(id: i64) -> Product {
        Product {
            id: ProductId(id),
            name: format!("Product {id}"),
            product_unit_type_id: UnitTypeId(1),
            unit_labor_cost: dec("13"),
            description: None,
            image_url: None,
        }
    }

    fn fixture() -> CatalogData {
        let now = Utc::now();
        CatalogData {
            unit_types: vec![UnitType {
                id: UnitTypeId(1),
                name: "linear foot".into(),
                category: "length".into(),
            }],
            materials: vec![Material {
                id: MaterialId(1),
                name: "Post".into(),
                description: None,
                cost_per_supplier_unit: dec("18.01"),
                supplier_unit_type_id: None,
                base_unit_type_id: UnitTypeId(1),
                quantity_in_supplier_unit: dec("1"),
                cull_rate: Some(dec("0.05")),
            }],
            products: vec![product(1), product(2)],
            product_materials: vec![ProductMaterial {
                id: ProductMaterialId(1),
                product_id: ProductId(1),
                material_id: MaterialId(1),
                quantity_of_material_base_units_per_product_unit: dec("0.166666666667"),
                cull_included: false,
            }],
            variation_groups: vec![
                group(1, 1, SelectionType::SingleChoice),
                group(2, 1, SelectionType::MultiChoice),
                group(3, 2, SelectionType::SingleChoice),
            ],
            variation_options: vec![
                option(1, 1),
                option(2, 1),
                option(3, 2),
                option(4, 2),
                option(5, 3),
            ],
            variation_option_materials: vec![VariationOptionMaterial {
                id: VariationOptionMaterialId(1),
                variation_option_id: VariationOptionId(2),
                material_id: MaterialId(1),
                quantity_of_material_base_units_added: dec("0.05"),
                cull_included: false,
            }],
            quote_configs: vec![QuoteConfig {
                id: QuoteConfigId(1),
                name: "Standard".into(),
                margin_rate: dec("0.30"),
                tax_rate: dec("0.085"),
                sales_commission_rate: dec("0.07"),
                franchise_fee_rate: dec("0.04"),
                additional_fixed_fees: Decimal::ZERO,
                material_cull_rate: None,
                round_up_materials: false,
            }],
            quotes: vec![Quote {
                id: QuoteId(1),
                name: Some("Smith backyard".into()),
                description: None,
                quote_config_id: QuoteConfigId(1),
                status: QuoteStatus::Draft,
                quote_type: QuoteType::FenceProject,
                created_at: now,
                updated_at: now,
            }],
            product_entries: vec![QuoteProductEntry {
                id: EntryId(1),
                quote_id: QuoteId(1),
                product_id: ProductId(1),
                role: ProductRole::Main,
                quantity_of_product_units: dec("100"),
                notes: None,
            }],
            entry_variations: vec![QuoteProductEntryVariation {
                quote_product_entry_id: EntryId(1),
                variation_option_id: VariationOptionId(1),
            }],
        }
    }

    async fn seeded() -> Store {
        let store = Store::in_memory().await.unwrap();
        store.seed(&fixture()).await.unwrap();
        store
    }

    fn options(ids: &[i64]) -> Vec<VariationOptionId> {
        ids.iter().copied().map(VariationOptionId).collect()
    }

    #[tokio::test]
    async fn snapshot_round_trips_seeded_catalog() {
        let store = seeded().await;
        let snap = store.load_quote_snapshot(QuoteId(1)).await.unwrap();
        let quote = snap.quote(QuoteId(1)).unwrap();
        assert_eq!(quote.status, QuoteStatus::Draft);
        assert_eq!(quote.quote_type, QuoteType::FenceProject);
        let entries = snap.product_entries(QuoteId(1)).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].quantity_of_product_units, dec("100"));
        let selected: Vec<_> = snap
            .selected_options(EntryId(1))
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(selected, options(&[1]));
        let post = snap.material(MaterialId(1)).unwrap();
        assert_eq!(post.cost_per_supplier_unit, dec("18.01"));
        assert_eq!(post.cull_rate, Some(dec("0.05")));
        let added = snap.option_materials(VariationOptionId(2)).unwrap();
        assert_eq!(added[0].quantity_of_material_base_units_added, dec("0.05"));
        assert_eq!(snap.quote_config(QuoteConfigId(1)).unwrap().tax_rate, dec("0.085"));
    }

    #[tokio::test]
    async fn seeding_twice_keeps_existing_rows() {
        let store = seeded().await;
        let mut changed = fixture();
        changed.materials[0].cost_per_supplier_unit = dec("99");
        store.seed(&changed).await.unwrap();
        let snap = store.load_quote_snapshot(QuoteId(1)).await.unwrap();
        assert_eq!(
            snap.material(MaterialId(1)).unwrap().cost_per_supplier_unit,
            dec("18.01")
        );
        assert_eq!(snap.selected_options(EntryId(1)).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn seed_rejects_dangling_reference() {
        let store = Store::in_memory().await.unwrap();
        let mut data = fixture();
        data.product_materials[0].material_id = MaterialId(42);
        let err = store.seed(&data).await.unwrap_err();
        assert!(matches!(err, PersistenceError::Validation(_)));
    }

    #[tokio::test]
    async fn unique_roles_are_enforced() {
        let store = seeded().await;
        let main = NewProductEntry {
            product_id: ProductId(2),
            role: ProductRole::Main,
            quantity_of_product_units: dec("10"),
            notes: None,
        };
        let err = store
            .add_product_entry(QuoteId(1), main.clone())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::RoleTaken {
                role: ProductRole::Main,
                ..
            }
        ));

        let extra = NewProductEntry {
            role: ProductRole::Additional,
            ..main
        };
        let a = store.add_product_entry(QuoteId(1), extra.clone()).await.unwrap();
        let b = store.add_product_entry(QuoteId(1), extra).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(a.role, ProductRole::Additional);

        store.remove_product_entry(a.id).await.unwrap();
        let snap = store.load_quote_snapshot(QuoteId(1)).await.unwrap();
        assert_eq!(snap.product_entries(QuoteId(1)).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn negative_quantity_and_unknown_product_rejected() {
        let store = seeded().await;
        let bad = NewProductEntry {
            product_id: ProductId(2),
            role: ProductRole::Default,
            quantity_of_product_units: dec("-1"),
            notes: None,
        };
        assert!(matches!(
            store.add_product_entry(QuoteId(1), bad.clone()).await,
            Err(PersistenceError::NegativeQuantity(_))
        ));
        let missing = NewProductEntry {
            product_id: ProductId(9),
            quantity_of_product_units: dec("1"),
            ..bad
        };
        assert!(matches!(
            store.add_product_entry(QuoteId(1), missing).await,
            Err(PersistenceError::NotFound {
                entity: "product",
                id: 9
            })
        ));
    }

    #[tokio::test]
    async fn single_choice_replaces_and_multi_choice_toggles() {
        let store = seeded().await;
        let sel = store
            .select_variation_option(EntryId(1), VariationOptionId(2))
            .await
            .unwrap();
        assert_eq!(sel, options(&[2]));

        let sel = store
            .select_variation_option(EntryId(1), VariationOptionId(3))
            .await
            .unwrap();
        assert_eq!(sel, options(&[2, 3]));
        let sel = store
            .select_variation_option(EntryId(1), VariationOptionId(4))
            .await
            .unwrap();
        assert_eq!(sel, options(&[2, 3, 4]));
        let sel = store
            .select_variation_option(EntryId(1), VariationOptionId(3))
            .await
            .unwrap();
        assert_eq!(sel, options(&[2, 4]));

        // Re-selecting a single-choice option keeps it.
        let sel = store
            .select_variation_option(EntryId(1), VariationOptionId(2))
            .await
            .unwrap();
        assert_eq!(sel, options(&[2, 4]));
    }

    #[tokio::test]
    async fn option_of_another_product_rejected() {
        let store = seeded().await;
        let err = store
            .select_variation_option(EntryId(1), VariationOptionId(5))
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::ForeignOption { .. }));
    }

    #[tokio::test]
    async fn finalized_quote_is_locked() {
        let store = seeded().await;
        let quote = store.finalize_quote(QuoteId(1)).await.unwrap();
        assert_eq!(quote.status, QuoteStatus::Final);

        let err = store
            .select_variation_option(EntryId(1), VariationOptionId(2))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::Locked {
                status: QuoteStatus::Final,
                ..
            }
        ));
        assert!(matches!(
            store.remove_product_entry(EntryId(1)).await,
            Err(PersistenceError::Locked { .. })
        ));

        let err = store.finalize_quote(QuoteId(1)).await.unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::Validation(ValidationError::InvalidTransition { .. })
        ));
        let sent = store.mark_quote_sent(QuoteId(1)).await.unwrap();
        assert_eq!(sent.status, QuoteStatus::Sent);
    }

    #[tokio::test]
    async fn draft_cannot_be_sent() {
        let store = seeded().await;
        assert!(matches!(
            store.mark_quote_sent(QuoteId(1)).await,
            Err(PersistenceError::Validation(
                ValidationError::InvalidTransition { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn created_quote_starts_as_draft() {
        let store = seeded().await;
        let quote = store
            .create_quote(NewQuote {
                name: Some("Deck".into()),
                description: None,
                quote_config_id: QuoteConfigId(1),
                quote_type: QuoteType::DeckProject,
            })
            .await
            .unwrap();
        assert_eq!(quote.status, QuoteStatus::Draft);
        assert_eq!(store.quote(quote.id).await.unwrap(), quote);

        let err = store
            .create_quote(NewQuote {
                name: None,
                description: None,
                quote_config_id: QuoteConfigId(7),
                quote_type: QuoteType::General,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PersistenceError::NotFound {
                entity: "quote config",
                id: 7
            }
        ));
    }

    #[tokio::test]
    async fn calculated_history_is_append_only() {
        let store = seeded().await;
        assert!(store
            .latest_calculated_quote(QuoteId(1))
            .await
            .unwrap()
            .is_none());
        let mut calc = CalculatedQuote {
            id: None,
            quote_id: QuoteId(1),
            bill_of_materials: vec![BillOfMaterialEntry {
                entry_id: EntryId(1),
                material_id: MaterialId(1),
                material_name: "Post".into(),
                quantity: dec("16.6667"),
                unit_cost: dec("18.01"),
                total_cost: dec("300.17"),
                unit_name: "linear foot".into(),
                cull_units: None,
                leftovers: None,
            }],
            total_material_cost: dec("300.17"),
            total_labor_cost: dec("1300.00"),
            cost_of_goods_sold: dec("1600.17"),
            applied_rates_info: vec![AppliedRateInfo {
                name: "Sales Tax".into(),
                kind: RateKind::Tax,
                rate_value: dec("0.085"),
                applied_amount: dec("136.01"),
            }],
            subtotal_before_tax: dec("1600.17"),
            tax_amount: dec("136.01"),
            final_price: dec("1736.18"),
            calculated_at: Utc::now(),
        };
        let first = store.insert_calculated_quote(&calc).await.unwrap();
        calc.final_price = dec("1800.00");
        let second = store.insert_calculated_quote(&calc).await.unwrap();
        assert!(second > first);

        let latest = store
            .latest_calculated_quote(QuoteId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, Some(second));
        assert_eq!(latest.final_price.to_string(), "1800.00");
        assert_eq!(latest.bill_of_materials, calc.bill_of_materials);
        assert_eq!(latest.applied_rates_info[0].kind, RateKind::Tax);

        let history = store.calculated_quotes(QuoteId(1)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].final_price, dec("1736.18"));
    }

    #[tokio::test]
    async fn record_calculation_writes_only_on_success() {
        let store = seeded().await;
        let err = store
            .record_calculation(QuoteId(1), |_| {
                Err::<CalculatedQuote, _>(PersistenceError::not_found("material", 9))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { id: 9, .. }));
        assert!(store.calculated_quotes(QuoteId(1)).await.unwrap().is_empty());

        let calc = store
            .record_calculation(QuoteId(1), |snapshot| {
                let quote = snapshot.quote(QuoteId(1)).unwrap();
                assert_eq!(snapshot.product_entries(quote.id).unwrap().len(), 1);
                Ok::<_, PersistenceError>(CalculatedQuote {
                    id: None,
                    quote_id: quote.id,
                    bill_of_materials: vec![],
                    total_material_cost: Decimal::ZERO,
                    total_labor_cost: dec("1300.00"),
                    cost_of_goods_sold: dec("1300.00"),
                    applied_rates_info: vec![],
                    subtotal_before_tax: dec("1300.00"),
                    tax_amount: Decimal::ZERO,
                    final_price: dec("1300.00"),
                    calculated_at: Utc::now(),
                })
            })
            .await
            .unwrap();
        let latest = store
            .latest_calculated_quote(QuoteId(1))
            .await
            .unwrap()
            .unwrap();
        assert!(calc.id.is_some());
        assert_eq!(latest.id, calc.id);
        assert_eq!(latest.final_price.to_string(), "1300.00");
    }

    #[tokio::test]
    async fn missing_quote_is_not_found() {
        let store = seeded().await;
        assert!(matches!(
            store.load_quote_snapshot(QuoteId(404)).await,
            Err(PersistenceError::NotFound {
                entity: "quote",
                id: 404
            })
        ));
        assert!(matches!(
            store.select_variation_option(EntryId(9), VariationOptionId(1)).await,
            Err(PersistenceError::NotFound { entity: "entry", .. })
        ));
    }
}
