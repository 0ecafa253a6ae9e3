//! Read-only reference data: order lines and historical allocations.

use std::sync::Arc;

use collo_allocation::{HistoricalAllocation, OrderLine};
use collo_core::DestinationId;

use crate::wip_store::WipStoreError;

pub trait ReferenceData: Send + Sync {
    fn order_lines(&self, destination: DestinationId) -> Result<Vec<OrderLine>, WipStoreError>;

    fn historical_allocations(
        &self,
        destination: DestinationId,
    ) -> Result<Vec<HistoricalAllocation>, WipStoreError>;

    /// Exact lookup by article code or EAN.
    fn lookup_article(
        &self,
        destination: DestinationId,
        code: &str,
    ) -> Result<Option<OrderLine>, WipStoreError> {
        Ok(self
            .order_lines(destination)?
            .into_iter()
            .find(|line| line.matches_code(code)))
    }
}

impl<S> ReferenceData for Arc<S>
where
    S: ReferenceData + ?Sized,
{
    fn order_lines(&self, destination: DestinationId) -> Result<Vec<OrderLine>, WipStoreError> {
        (**self).order_lines(destination)
    }

    fn historical_allocations(
        &self,
        destination: DestinationId,
    ) -> Result<Vec<HistoricalAllocation>, WipStoreError> {
        (**self).historical_allocations(destination)
    }

    fn lookup_article(
        &self,
        destination: DestinationId,
        code: &str,
    ) -> Result<Option<OrderLine>, WipStoreError> {
        (**self).lookup_article(destination, code)
    }
}
