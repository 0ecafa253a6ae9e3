//! Package sequencer: contiguous numbering and session-local reservations.
//!
//! New package numbers can only be introduced at the first free slot, and
//! every in-flight claim on such a slot is recorded in `Reservations` so two
//! rows of one session never claim the same new number. Claims are resolved
//! first-claim-wins: a claim is visible to every later `next_required()` call
//! the moment it is accepted.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use collo_core::RowId;

use crate::ledger::AllocationLedger;
use crate::model::PackageNumber;

/// Why a proposed package number was rejected.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SequenceViolation {
    #[error("package {0} is already confirmed")]
    AlreadyConfirmed(PackageNumber),

    #[error("create package {required} first (requested {proposed})")]
    CreateFirst {
        proposed: PackageNumber,
        required: PackageNumber,
    },

    #[error("the next new package is {required}, not {proposed}")]
    NotNextRequired {
        proposed: PackageNumber,
        required: PackageNumber,
    },
}

/// Session-local claims on not-yet-existing package numbers.
///
/// Never persisted; dropped with the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reservations {
    by_row: BTreeMap<RowId, PackageNumber>,
}

impl Reservations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, row: RowId) -> Option<PackageNumber> {
        self.by_row.get(&row).copied()
    }

    /// Set or refresh `row`'s reservation, returning the previous one.
    pub fn reserve(&mut self, row: RowId, package: PackageNumber) -> Option<PackageNumber> {
        self.by_row.insert(row, package)
    }

    pub fn release(&mut self, row: RowId) -> Option<PackageNumber> {
        self.by_row.remove(&row)
    }

    pub fn is_reserved(&self, package: PackageNumber) -> bool {
        self.by_row.values().any(|p| *p == package)
    }

    pub fn iter(&self) -> impl Iterator<Item = (RowId, PackageNumber)> + '_ {
        self.by_row.iter().map(|(r, p)| (*r, *p))
    }

    pub fn len(&self) -> usize {
        self.by_row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_row.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_row.clear();
    }

    /// Drop reservations whose package has come into existence.
    ///
    /// Returns the rows whose reservation was pruned.
    pub fn prune_existing(&mut self, existing: &BTreeSet<PackageNumber>) -> Vec<RowId> {
        let pruned: Vec<RowId> = self
            .by_row
            .iter()
            .filter(|(_, p)| existing.contains(p))
            .map(|(r, _)| *r)
            .collect();
        for row in &pruned {
            self.by_row.remove(row);
        }
        pruned
    }
}

/// Outcome of `PackageSequencer::assign`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Row points at an existing, unconfirmed package; its reservation was released.
    Existing(PackageNumber),
    /// Row claimed a new package number, now reserved for it.
    Reserved(PackageNumber),
    /// Proposal rejected; the row snapped to `snapped_to`, reserved for it.
    Rejected {
        snapped_to: PackageNumber,
        violation: SequenceViolation,
    },
}

impl Assignment {
    /// The package the row ends up pointing at.
    pub fn package(&self) -> PackageNumber {
        match self {
            Assignment::Existing(p) | Assignment::Reserved(p) => *p,
            Assignment::Rejected { snapped_to, .. } => *snapped_to,
        }
    }

    pub fn violation(&self) -> Option<SequenceViolation> {
        match self {
            Assignment::Rejected { violation, .. } => Some(*violation),
            _ => None,
        }
    }
}

/// Package numbering rules over one snapshot.
///
/// Reservations are passed in per call so one sequencer can serve every row
/// of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSequencer {
    existing: BTreeSet<PackageNumber>,
    confirmed: BTreeSet<PackageNumber>,
}

impl PackageSequencer {
    pub fn new(existing: BTreeSet<PackageNumber>, confirmed: BTreeSet<PackageNumber>) -> Self {
        Self { existing, confirmed }
    }

    pub fn from_ledger(ledger: &AllocationLedger<'_>) -> Self {
        Self::new(ledger.existing_packages(), ledger.confirmed_packages())
    }

    pub fn existing(&self) -> &BTreeSet<PackageNumber> {
        &self.existing
    }

    /// Smallest positive number neither existing nor reserved.
    pub fn next_required(&self, reservations: &Reservations) -> PackageNumber {
        self.first_free(reservations, None)
    }

    /// Like `next_required`, ignoring `row`'s own reservation.
    pub fn next_required_for(&self, reservations: &Reservations, row: RowId) -> PackageNumber {
        self.first_free(reservations, Some(row))
    }

    /// Largest `N` such that packages `1..=N` all exist (0 when package 1 is absent).
    pub fn max_continuous(&self) -> u32 {
        // `existing` is ordered: the prefix ends at the first number out of step.
        self.existing
            .iter()
            .zip(1u32..)
            .take_while(|(p, n)| p.get() == *n)
            .count() as u32
    }

    /// Claim the next free number for a freshly opened row.
    ///
    /// A row that already holds a valid reservation keeps it.
    pub fn claim_next(&self, reservations: &mut Reservations, row: RowId) -> PackageNumber {
        let package = self.fallback(reservations, row);
        reservations.reserve(row, package);
        tracing::debug!(%row, %package, "claimed package number");
        package
    }

    /// Point `row` at `proposed`, enforcing the numbering rules.
    pub fn assign(&self, reservations: &mut Reservations, row: RowId, proposed: PackageNumber) -> Assignment {
        if self.confirmed.contains(&proposed) {
            return self.reject(reservations, row, SequenceViolation::AlreadyConfirmed(proposed));
        }

        if self.existing.contains(&proposed) {
            if proposed.get() <= self.max_continuous() + 1 {
                reservations.release(row);
                return Assignment::Existing(proposed);
            }
            let required = self.first_missing();
            return self.reject(reservations, row, SequenceViolation::CreateFirst { proposed, required });
        }

        let required = self.next_required_for(reservations, row);
        if proposed == required {
            reservations.reserve(row, proposed);
            return Assignment::Reserved(proposed);
        }
        self.reject(reservations, row, SequenceViolation::NotNextRequired { proposed, required })
    }

    /// Check that a package may be opened for editing, without reserving it.
    pub fn check_open(&self, reservations: &Reservations, package: PackageNumber) -> Result<(), SequenceViolation> {
        if self.existing.contains(&package) {
            if package.get() <= self.max_continuous() + 1 {
                return Ok(());
            }
            return Err(SequenceViolation::CreateFirst {
                proposed: package,
                required: self.first_missing(),
            });
        }
        let required = self.next_required(reservations);
        if package == required {
            Ok(())
        } else {
            Err(SequenceViolation::NotNextRequired {
                proposed: package,
                required,
            })
        }
    }

    fn reject(&self, reservations: &mut Reservations, row: RowId, violation: SequenceViolation) -> Assignment {
        let snapped_to = self.fallback(reservations, row);
        reservations.reserve(row, snapped_to);
        tracing::debug!(%row, %snapped_to, %violation, "package assignment rejected");
        Assignment::Rejected {
            snapped_to,
            violation,
        }
    }

    /// The row's own (still valid) reservation, else the first free number.
    fn fallback(&self, reservations: &Reservations, row: RowId) -> PackageNumber {
        reservations
            .get(row)
            .filter(|p| !self.existing.contains(p))
            .unwrap_or_else(|| self.first_free(reservations, Some(row)))
    }

    /// First number missing from the contiguous prefix.
    fn first_missing(&self) -> PackageNumber {
        let mut candidate = PackageNumber::FIRST;
        while self.existing.contains(&candidate) {
            candidate = candidate.next();
        }
        candidate
    }

    /// Smallest number not existing and not reserved by a row other than `owner`.
    fn first_free(&self, reservations: &Reservations, owner: Option<RowId>) -> PackageNumber {
        let taken: BTreeSet<PackageNumber> = reservations
            .iter()
            .filter(|(r, _)| Some(*r) != owner)
            .map(|(_, p)| p)
            .chain(self.existing.iter().copied())
            .collect();

        let mut candidate = PackageNumber::FIRST;
        while taken.contains(&candidate) {
            candidate = candidate.next();
        }
        candidate
    }
}
