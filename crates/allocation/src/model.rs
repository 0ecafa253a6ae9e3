use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use collo_core::{DomainError, DomainResult, OperatorId, VersionToken};

/// Article (SKU) code as printed on the order line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleCode(String);

impl ArticleCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for ArticleCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Purchase order reference the order line belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseOrderId(String);

impl PurchaseOrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PurchaseOrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (article, purchase order) pair every quantity is accounted against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AllocationKey {
    pub article_code: ArticleCode,
    pub purchase_order_id: PurchaseOrderId,
}

impl AllocationKey {
    pub fn new(article_code: impl Into<String>, purchase_order_id: impl Into<String>) -> Self {
        Self {
            article_code: ArticleCode::new(article_code),
            purchase_order_id: PurchaseOrderId::new(purchase_order_id),
        }
    }
}

impl core::fmt::Display for AllocationKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}@{}", self.article_code, self.purchase_order_id)
    }
}

/// Positive, sequential package (collo) number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PackageNumber(u32);

impl PackageNumber {
    pub const FIRST: PackageNumber = PackageNumber(1);

    pub fn new(value: u32) -> DomainResult<Self> {
        if value == 0 {
            return Err(DomainError::validation("package number must be positive"));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The package that must exist before this one can be introduced.
    pub fn previous(self) -> Option<Self> {
        (self.0 > 1).then(|| Self(self.0 - 1))
    }
}

impl TryFrom<u32> for PackageNumber {
    type Error = DomainError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PackageNumber> for u32 {
    fn from(value: PackageNumber) -> Self {
        value.0
    }
}

impl core::fmt::Display for PackageNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Order line: read-only reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub purchase_order_id: PurchaseOrderId,
    pub article_code: ArticleCode,
    pub ordered_quantity: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ean: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl OrderLine {
    pub fn new(
        purchase_order_id: impl Into<String>,
        article_code: impl Into<String>,
        ordered_quantity: u64,
    ) -> Self {
        Self {
            purchase_order_id: PurchaseOrderId::new(purchase_order_id),
            article_code: ArticleCode::new(article_code),
            ordered_quantity,
            ean: None,
            description: None,
        }
    }

    pub fn with_ean(mut self, ean: impl Into<String>) -> Self {
        self.ean = Some(ean.into());
        self
    }

    pub fn key(&self) -> AllocationKey {
        AllocationKey {
            article_code: self.article_code.clone(),
            purchase_order_id: self.purchase_order_id.clone(),
        }
    }

    /// Exact match of a scanned or typed code against the article code or EAN.
    pub fn matches_code(&self, code: &str) -> bool {
        self.article_code.as_str() == code || self.ean.as_deref() == Some(code)
    }
}

/// Quantity folded into a previously confirmed batch. Immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalAllocation {
    pub article_code: ArticleCode,
    pub purchase_order_id: PurchaseOrderId,
    pub quantity: u64,
}

impl HistoricalAllocation {
    pub fn new(key: AllocationKey, quantity: u64) -> Self {
        Self {
            article_code: key.article_code,
            purchase_order_id: key.purchase_order_id,
            quantity,
        }
    }

    pub fn key(&self) -> AllocationKey {
        AllocationKey {
            article_code: self.article_code.clone(),
            purchase_order_id: self.purchase_order_id.clone(),
        }
    }
}

/// Draft (WIP) allocation of an article quantity to one package.
///
/// Unique per (article, purchase order, package).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftAllocation {
    pub article_code: ArticleCode,
    pub purchase_order_id: PurchaseOrderId,
    pub quantity: u64,
    pub package_number: PackageNumber,
    #[serde(default)]
    pub confirmed: bool,
}

impl DraftAllocation {
    pub fn new(key: AllocationKey, quantity: u64, package_number: PackageNumber) -> Self {
        Self {
            article_code: key.article_code,
            purchase_order_id: key.purchase_order_id,
            quantity,
            package_number,
            confirmed: false,
        }
    }

    pub fn key(&self) -> AllocationKey {
        AllocationKey {
            article_code: self.article_code.clone(),
            purchase_order_id: self.purchase_order_id.clone(),
        }
    }

    pub fn has_key(&self, key: &AllocationKey) -> bool {
        self.article_code == key.article_code && self.purchase_order_id == key.purchase_order_id
    }
}

/// Package confirmation flags.
///
/// An entry (either value) makes the package exist even with zero rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confirmations(BTreeMap<PackageNumber, bool>);

impl Confirmations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, package: PackageNumber) -> Option<bool> {
        self.0.get(&package).copied()
    }

    pub fn is_confirmed(&self, package: PackageNumber) -> bool {
        self.get(package).unwrap_or(false)
    }

    pub fn contains(&self, package: PackageNumber) -> bool {
        self.0.contains_key(&package)
    }

    pub fn set(&mut self, package: PackageNumber, confirmed: bool) {
        self.0.insert(package, confirmed);
    }

    pub fn remove(&mut self, package: PackageNumber) -> Option<bool> {
        self.0.remove(&package)
    }

    pub fn packages(&self) -> impl Iterator<Item = PackageNumber> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PackageNumber, bool)> + '_ {
        self.0.iter().map(|(p, c)| (*p, *c))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(PackageNumber, bool)> for Confirmations {
    fn from_iter<T: IntoIterator<Item = (PackageNumber, bool)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Authoritative draft state of one destination, as held by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub allocations: Vec<DraftAllocation>,
    pub confirmations: Confirmations,
    pub version: VersionToken,
    /// Current (open) batch number, starting at 1.
    pub batch: u32,
    pub closed: bool,
    /// Operator of the last successful write (audit only).
    #[serde(default)]
    pub updated_by: Option<OperatorId>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// State of a destination that was never written.
    pub fn empty() -> Self {
        Self {
            allocations: Vec::new(),
            confirmations: Confirmations::new(),
            version: VersionToken::INITIAL,
            batch: 1,
            closed: false,
            updated_by: None,
            updated_at: None,
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}
