//! Pure quote calculation over a [`CatalogSource`].

use crate::assembly::assemble_quote;
use crate::EngineError;
use chrono::{DateTime, Utc};
use cpq_core::{CalculatedQuote, CatalogSource, QuoteId};
use cpq_pricing::{
    aggregate, build_bill_of_materials, calculated_quote, validate_quote_config,
    MarginConvention, RatePipeline,
};
use tracing::info;

/// Turns a quote and its catalog into a [`CalculatedQuote`].
///
/// Only the pipeline is held; calculation takes `&self`.
#[derive(Clone, Debug, Default)]
pub struct QuoteCalculator {
    pipeline: RatePipeline,
}

impl QuoteCalculator {
    pub fn new(pipeline: RatePipeline) -> Self {
        Self { pipeline }
    }

    /// Standard step order with the given margin convention.
    pub fn with_convention(convention: MarginConvention) -> Self {
        Self::new(RatePipeline::standard(convention))
    }

    pub fn pipeline(&self) -> &RatePipeline {
        &self.pipeline
    }

    pub fn calculate<S: CatalogSource + ?Sized>(
        &self,
        source: &S,
        quote_id: QuoteId,
    ) -> Result<CalculatedQuote, EngineError> {
        self.calculate_at(source, quote_id, Utc::now())
    }

    /// Same as [`calculate`](Self::calculate) with a fixed timestamp.
    pub fn calculate_at<S: CatalogSource + ?Sized>(
        &self,
        source: &S,
        quote_id: QuoteId,
        calculated_at: DateTime<Utc>,
    ) -> Result<CalculatedQuote, EngineError> {
        let quote = source.quote(quote_id)?;
        if !quote.status.is_editable() {
            return Err(EngineError::InvalidState(format!(
                "quote {} is {} and can no longer be recalculated",
                quote.id, quote.status
            )));
        }
        let config = source.quote_config(quote.quote_config_id)?;
        validate_quote_config(&config)?;

        let entries = assemble_quote(source, &quote)?.into_entries();
        let boms = entries
            .iter()
            .map(|e| build_bill_of_materials(e, config.round_up_materials))
            .collect::<Result<Vec<_>, _>>()?;
        let costs = aggregate(&entries, &boms)?;
        let breakdown = self.pipeline.apply(&costs, &config)?;
        let calc = calculated_quote(quote.id, &boms, &costs, &breakdown, calculated_at);
        info!(
            quote = %quote.id,
            entries = entries.len(),
            convention = %self.pipeline.convention(),
            cogs = %calc.cost_of_goods_sold,
            final_price = %calc.final_price,
            "quote calculated"
        );
        Ok(calc)
    }
}
