//! Ordered application of the configured financial rates.

use crate::costs::CostSummary;
use crate::{add, mul, PricingError};
use cpq_core::{AppliedRateInfo, ParseEnumError, QuoteConfig, RateKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How the margin rate turns cost of goods sold into margin. The base is
/// COGS alone; COGS-based fees are not marked up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginConvention {
    /// `COGS × m`: price is `COGS × (1 + m)` before fees.
    #[default]
    Markup,
    /// `COGS × m / (1 − m)`: margin is `m` of the price `COGS / (1 − m)`.
    GrossMargin,
}

impl MarginConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarginConvention::Markup => "markup",
            MarginConvention::GrossMargin => "gross_margin",
        }
    }

    /// Margin amount for `cogs` at `rate`.
    ///
    /// Example:
    /// Markup on 1000.00 at 0.30 is 300.00; gross margin is 428.57...
    pub fn margin_amount(self, cogs: Decimal, rate: Decimal) -> Result<Decimal, PricingError> {
        match self {
            MarginConvention::Markup => mul(cogs, rate, "margin"),
            MarginConvention::GrossMargin => {
                let kept = Decimal::ONE - rate;
                if kept <= Decimal::ZERO {
                    return Err(PricingError::InvalidConfig(format!(
                        "margin_rate {rate} leaves no cost share"
                    )));
                }
                mul(cogs, rate, "margin")?
                    .checked_div(kept)
                    .ok_or(PricingError::Overflow("margin"))
            }
        }
    }
}

impl fmt::Display for MarginConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarginConvention {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markup" => Ok(MarginConvention::Markup),
            "gross_margin" => Ok(MarginConvention::GrossMargin),
            other => Err(ParseEnumError::new("margin convention", other)),
        }
    }
}

/// One stage of the rate pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateStep {
    CullUplift,
    SalesCommission,
    FranchiseFee,
    Margin,
    FixedFees,
    SalesTax,
}

impl RateStep {
    /// Display name recorded with the applied rate.
    pub fn label(&self) -> &'static str {
        match self {
            RateStep::CullUplift => "Material Cull",
            RateStep::SalesCommission => "Sales Commission",
            RateStep::FranchiseFee => "Franchise Fee",
            RateStep::Margin => "Margin",
            RateStep::FixedFees => "Additional Fixed Fees",
            RateStep::SalesTax => "Sales Tax",
        }
    }

    pub fn kind(&self) -> RateKind {
        match self {
            RateStep::CullUplift => RateKind::CullUplift,
            RateStep::SalesCommission | RateStep::FranchiseFee => RateKind::FeeOnCogs,
            RateStep::Margin => RateKind::Margin,
            RateStep::FixedFees => RateKind::FeeFixed,
            RateStep::SalesTax => RateKind::Tax,
        }
    }
}

impl fmt::Display for RateStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Totals produced by the pipeline, unrounded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PriceBreakdown {
    pub cost_of_goods_sold: Decimal,
    pub applied_rates: Vec<AppliedRateInfo>,
    pub subtotal_before_tax: Decimal,
    pub tax_amount: Decimal,
    pub final_price: Decimal,
}

/// Reject rates outside their domain before any computation.
pub fn validate_quote_config(config: &QuoteConfig) -> Result<(), PricingError> {
    let fields = [
        ("margin_rate", config.margin_rate),
        ("tax_rate", config.tax_rate),
        ("sales_commission_rate", config.sales_commission_rate),
        ("franchise_fee_rate", config.franchise_fee_rate),
        ("additional_fixed_fees", config.additional_fixed_fees),
        (
            "material_cull_rate",
            config.material_cull_rate.unwrap_or(Decimal::ZERO),
        ),
    ];
    for (name, value) in fields {
        if value < Decimal::ZERO {
            return Err(PricingError::InvalidConfig(format!(
                "quote config {}: {name} must be >= 0, got {value}",
                config.id
            )));
        }
    }
    if config.margin_rate >= Decimal::ONE {
        return Err(PricingError::InvalidConfig(format!(
            "quote config {}: margin_rate must be < 1, got {}",
            config.id, config.margin_rate
        )));
    }
    Ok(())
}

/// Ordered list of rate steps with the margin convention in force.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RatePipeline {
    steps: Vec<RateStep>,
    convention: MarginConvention,
}

impl Default for RatePipeline {
    fn default() -> Self {
        Self::standard(MarginConvention::default())
    }
}

impl RatePipeline {
    /// Cull, commission, franchise fee, margin, fixed fees, then tax.
    pub const STANDARD_ORDER: [RateStep; 6] = [
        RateStep::CullUplift,
        RateStep::SalesCommission,
        RateStep::FranchiseFee,
        RateStep::Margin,
        RateStep::FixedFees,
        RateStep::SalesTax,
    ];

    pub fn standard(convention: MarginConvention) -> Self {
        Self {
            steps: Self::STANDARD_ORDER.to_vec(),
            convention,
        }
    }

    /// Custom ordering; every step may appear at most once.
    pub fn with_steps(
        steps: Vec<RateStep>,
        convention: MarginConvention,
    ) -> Result<Self, PricingError> {
        for (i, step) in steps.iter().enumerate() {
            if steps[..i].contains(step) {
                return Err(PricingError::DuplicateStep(*step));
            }
        }
        Ok(Self { steps, convention })
    }

    pub fn steps(&self) -> &[RateStep] {
        &self.steps
    }

    pub fn convention(&self) -> MarginConvention {
        self.convention
    }

    /// Apply every step in order to the aggregated costs.
    ///
    /// Percentage fees and margin are computed on COGS, tax on the running
    /// total at the point the tax step runs. Steps whose rate is zero add
    /// nothing and are not recorded.
    pub fn apply(
        &self,
        costs: &CostSummary,
        config: &QuoteConfig,
    ) -> Result<PriceBreakdown, PricingError> {
        validate_quote_config(config)?;
        let cogs = costs.cost_of_goods_sold()?;
        let mut running = cogs;
        let mut tax_amount = Decimal::ZERO;
        let mut applied = Vec::new();

        for step in &self.steps {
            let (rate, amount) = match step {
                RateStep::CullUplift => {
                    let rate = config.material_cull_rate.unwrap_or(Decimal::ZERO);
                    (rate, mul(costs.uncull_material_cost, rate, "cull uplift")?)
                }
                RateStep::SalesCommission => (
                    config.sales_commission_rate,
                    mul(cogs, config.sales_commission_rate, "sales commission")?,
                ),
                RateStep::FranchiseFee => (
                    config.franchise_fee_rate,
                    mul(cogs, config.franchise_fee_rate, "franchise fee")?,
                ),
                RateStep::Margin => (
                    config.margin_rate,
                    self.convention.margin_amount(cogs, config.margin_rate)?,
                ),
                RateStep::FixedFees => {
                    (config.additional_fixed_fees, config.additional_fixed_fees)
                }
                RateStep::SalesTax => {
                    tax_amount = mul(running, config.tax_rate, "sales tax")?;
                    (config.tax_rate, tax_amount)
                }
            };
            if rate.is_zero() || (*step == RateStep::CullUplift && amount.is_zero()) {
                continue;
            }
            running = add(running, amount, "running total")?;
            debug!(step = %step, %rate, %amount, %running, "rate applied");
            applied.push(AppliedRateInfo {
                name: step.label().to_string(),
                kind: step.kind(),
                rate_value: rate,
                applied_amount: amount,
            });
        }

        Ok(PriceBreakdown {
            cost_of_goods_sold: cogs,
            applied_rates: applied,
            subtotal_before_tax: running - tax_amount,
            tax_amount,
            final_price: running,
        })
    }
}
