//! Quotes, their product entries and rate configurations.

use crate::ids::*;
use crate::validate::ValidationError;
use crate::ParseEnumError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quote lifecycle: DRAFT -> FINAL -> SENT.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteStatus {
    #[default]
    Draft,
    Final,
    Sent,
}

impl QuoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteStatus::Draft => "DRAFT",
            QuoteStatus::Final => "FINAL",
            QuoteStatus::Sent => "SENT",
        }
    }

    /// Only draft quotes accept mutations and recalculation.
    pub fn is_editable(&self) -> bool {
        matches!(self, QuoteStatus::Draft)
    }

    /// Validate a lifecycle transition and return the new status.
    pub fn transition_to(self, next: QuoteStatus) -> Result<QuoteStatus, ValidationError> {
        match (self, next) {
            (QuoteStatus::Draft, QuoteStatus::Final) | (QuoteStatus::Final, QuoteStatus::Sent) => {
                Ok(next)
            }
            (from, to) => Err(ValidationError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(QuoteStatus::Draft),
            "FINAL" => Ok(QuoteStatus::Final),
            "SENT" => Ok(QuoteStatus::Sent),
            other => Err(ParseEnumError::new("quote status", other)),
        }
    }
}

/// Kind of project a quote prices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteType {
    #[default]
    General,
    FenceProject,
    DeckProject,
}

impl QuoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuoteType::General => "general",
            QuoteType::FenceProject => "fence_project",
            QuoteType::DeckProject => "deck_project",
        }
    }
}

impl fmt::Display for QuoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(QuoteType::General),
            "fence_project" => Ok(QuoteType::FenceProject),
            "deck_project" => Ok(QuoteType::DeckProject),
            other => Err(ParseEnumError::new("quote type", other)),
        }
    }
}

/// A customer quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub quote_config_id: QuoteConfigId,
    #[serde(default)]
    pub status: QuoteStatus,
    #[serde(default)]
    pub quote_type: QuoteType,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// Functional slot of a product entry within a quote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductRole {
    /// The fence itself; at most one per quote.
    Main,
    /// The gate; at most one per quote.
    Secondary,
    /// Add-on services.
    Additional,
    #[default]
    Default,
}

impl ProductRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductRole::Main => "MAIN",
            ProductRole::Secondary => "SECONDARY",
            ProductRole::Additional => "ADDITIONAL",
            ProductRole::Default => "DEFAULT",
        }
    }

    /// Roles limited to a single entry per quote.
    pub fn is_unique(&self) -> bool {
        matches!(self, ProductRole::Main | ProductRole::Secondary)
    }
}

impl fmt::Display for ProductRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MAIN" => Ok(ProductRole::Main),
            "SECONDARY" => Ok(ProductRole::Secondary),
            "ADDITIONAL" => Ok(ProductRole::Additional),
            "DEFAULT" => Ok(ProductRole::Default),
            other => Err(ParseEnumError::new("product role", other)),
        }
    }
}

/// A product placed on a quote with its quantity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteProductEntry {
    pub id: EntryId,
    pub quote_id: QuoteId,
    pub product_id: ProductId,
    #[serde(default)]
    pub role: ProductRole,
    pub quantity_of_product_units: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A variation option selected on an entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteProductEntryVariation {
    pub quote_product_entry_id: EntryId,
    pub variation_option_id: VariationOptionId,
}

/// Named set of financial rates. Rates are fractions (0.07 = 7%).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteConfig {
    pub id: QuoteConfigId,
    pub name: String,
    #[serde(default)]
    pub margin_rate: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub sales_commission_rate: Decimal,
    #[serde(default)]
    pub franchise_fee_rate: Decimal,
    /// Flat amount added after percentage rates, before tax.
    #[serde(default)]
    pub additional_fixed_fees: Decimal,
    /// Cost uplift for material that carries no wastage allowance of its own.
    #[serde(default)]
    pub material_cull_rate: Option<Decimal>,
    /// Round material quantities up to whole base units.
    #[serde(default)]
    pub round_up_materials: bool,
}
