//! Residual calculator: how much of an order line is still allocatable.

use crate::error::AllocationError;
use crate::ledger::AllocationLedger;
use crate::model::{AllocationKey, PackageNumber};

/// Remaining allocatable quantity for `key`.
///
/// `ordered − historical − drafts (all packages except excluding_package) −
/// staged`, where `staged` are the quantities held by other currently-open
/// input rows. Never negative.
pub fn residual<'s>(
    ledger: &AllocationLedger<'_>,
    key: &AllocationKey,
    excluding_package: Option<PackageNumber>,
    staged: impl IntoIterator<Item = (&'s AllocationKey, u64)>,
) -> u64 {
    let staged: u64 = staged
        .into_iter()
        .filter(|(k, _)| *k == key)
        .map(|(_, q)| q)
        .fold(0, u64::saturating_add);

    let value = ledger
        .ordered_quantity(key)
        .saturating_sub(ledger.historical_quantity(key))
        .saturating_sub(ledger.draft_quantity(key, excluding_package))
        .saturating_sub(staged);

    tracing::debug!(%key, ?excluding_package, staged, residual = value, "computed residual");
    value
}

/// Reject (never clamp) a requested quantity against a residual.
pub fn ensure_within_residual(
    key: &AllocationKey,
    requested: u64,
    residual: u64,
) -> Result<(), AllocationError> {
    if requested == 0 {
        return Err(AllocationError::ZeroQuantity);
    }
    if residual == 0 {
        return Err(AllocationError::NothingLeft(key.clone()));
    }
    if requested > residual {
        return Err(AllocationError::ExceedsResidual {
            key: key.clone(),
            requested,
            residual,
        });
    }
    Ok(())
}
