//! Async quote service over the SQLite store.

use crate::{EngineError, QuoteCalculator};
use cpq_core::{CalculatedQuote, Quote, QuoteId};
use persistence::Store;
use tracing::info;

/// Loads a consistent snapshot, calculates, and appends the result.
#[derive(Clone, Debug)]
pub struct QuoteService {
    store: Store,
    calculator: QuoteCalculator,
}

impl QuoteService {
    pub fn new(store: Store, calculator: QuoteCalculator) -> Self {
        Self { store, calculator }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Calculate `quote_id` and persist a new snapshot.
    ///
    /// Reading the quote and appending the result share one transaction;
    /// nothing is written when any step fails.
    pub async fn calculate(&self, quote_id: QuoteId) -> Result<CalculatedQuote, EngineError> {
        let calc = self
            .store
            .record_calculation(quote_id, |snapshot| {
                self.calculator.calculate(snapshot, quote_id)
            })
            .await?;
        if let Some(id) = calc.id {
            info!(quote = %quote_id, calculated = %id, "snapshot persisted");
        }
        Ok(calc)
    }

    pub async fn latest_calculated_quote(
        &self,
        quote_id: QuoteId,
    ) -> Result<Option<CalculatedQuote>, EngineError> {
        self.store.quote(quote_id).await?;
        Ok(self.store.latest_calculated_quote(quote_id).await?)
    }

    /// Lock the quote against further edits and recalculation.
    pub async fn finalize(&self, quote_id: QuoteId) -> Result<Quote, EngineError> {
        Ok(self.store.finalize_quote(quote_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use crate::ErrorKind;
    use cpq_core::{EntryId, VariationOptionId};

    async fn service() -> QuoteService {
        let store = Store::in_memory().await.unwrap();
        store.seed(&reference_scenario().catalog).await.unwrap();
        QuoteService::new(store, QuoteCalculator::default())
    }

    #[tokio::test]
    async fn calculate_persists_snapshot() {
        let svc = service().await;
        assert!(svc
            .latest_calculated_quote(QuoteId(1))
            .await
            .unwrap()
            .is_none());

        let calc = svc.calculate(QuoteId(1)).await.unwrap();
        assert!(calc.id.is_some());
        assert_eq!(calc.cost_of_goods_sold.to_string(), "4408.71");
        assert_eq!(calc.final_price.to_string(), "6744.66");

        let latest = svc
            .latest_calculated_quote(QuoteId(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, calc.id);
        assert_eq!(latest.final_price, calc.final_price);
        assert_eq!(latest.bill_of_materials, calc.bill_of_materials);
        assert_eq!(latest.applied_rates_info, calc.applied_rates_info);
    }

    #[tokio::test]
    async fn recalculation_after_edit_appends_history() {
        let svc = service().await;
        let first = svc.calculate(QuoteId(1)).await.unwrap();
        svc.store()
            .select_variation_option(EntryId(1), VariationOptionId(10))
            .await
            .unwrap();
        let second = svc.calculate(QuoteId(1)).await.unwrap();
        assert_eq!(second.cost_of_goods_sold.to_string(), "4636.87");
        assert_ne!(first.id, second.id);

        let history = svc.store().calculated_quotes(QuoteId(1)).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].final_price, first.final_price);
    }

    #[tokio::test]
    async fn finalized_quote_rejects_calculation_without_writing() {
        let svc = service().await;
        svc.finalize(QuoteId(1)).await.unwrap();
        let err = svc.calculate(QuoteId(1)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(svc
            .store()
            .calculated_quotes(QuoteId(1))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            svc.finalize(QuoteId(1)).await.unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[tokio::test]
    async fn failed_calculation_leaves_no_history() {
        let store = Store::in_memory().await.unwrap();
        let mut data = reference_scenario().catalog;
        data.quote_configs[0].margin_rate = dec("1");
        store.seed(&data).await.unwrap();
        let svc = QuoteService::new(store, QuoteCalculator::default());
        assert_eq!(
            svc.calculate(QuoteId(1)).await.unwrap_err().kind(),
            ErrorKind::InvalidConfig
        );
        assert!(svc
            .store()
            .calculated_quotes(QuoteId(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn unknown_quote_is_not_found() {
        let svc = service().await;
        assert_eq!(
            svc.calculate(QuoteId(77)).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            svc.latest_calculated_quote(QuoteId(77))
                .await
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }
}
