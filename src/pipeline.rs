//! Orchestrates cleaning, reference normalization and the two view builders.

use polars::prelude::DataFrame;
use tracing::{info, warn};

use crate::error::ReconcileError;
use crate::models::Diagnostic;
use crate::processor::{
    CleaningSettings, CleaningStats, QuantityView, QuantityViewBuilder, ReferenceNormalizer,
    RevenueView, RevenueViewBuilder, TransactionCleaner,
};

/// The three raw tables a reconciliation starts from.
#[derive(Debug, Clone)]
pub struct RawSources {
    pub transactions: DataFrame,
    pub item_reference: DataFrame,
    pub combo_reference: DataFrame,
}

/// Both reconciled views plus the non-fatal findings collected on the way.
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub revenue: RevenueView,
    pub quantity: QuantityView,
    pub diagnostics: Vec<Diagnostic>,
    pub cleaning: CleaningStats,
}

impl Reconciled {
    pub fn combo_integrity_faults(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.is_combo_integrity_fault())
    }
}

pub fn reconcile(
    raw_transactions: &DataFrame,
    raw_item_ref: &DataFrame,
    raw_combo_ref: &DataFrame,
    settings: &CleaningSettings,
) -> Result<Reconciled, ReconcileError> {
    let transactions = TransactionCleaner::new(settings.clone()).clean(raw_transactions)?;

    let normalizer = ReferenceNormalizer;
    let items = normalizer.normalize_item_reference(raw_item_ref)?;
    let combos = normalizer.normalize_combo_reference(raw_combo_ref)?;

    let (revenue, misses) = RevenueViewBuilder.build(&transactions, &items);
    let (quantity, faults) = QuantityViewBuilder.build(&transactions, &items, &combos);

    // Integrity faults first: they point at a broken reference table.
    let diagnostics: Vec<Diagnostic> = faults.into_iter().chain(misses).collect();

    let faults = diagnostics
        .iter()
        .filter(|d| d.is_combo_integrity_fault())
        .count();
    if faults > 0 {
        warn!("Reconciliation finished with {} combo-integrity faults", faults);
    }
    info!(
        "Reconciled {} transactions: revenue view {} rows (total {:.2}), quantity view {} rows",
        transactions.len(),
        revenue.len(),
        revenue.total_final(),
        quantity.len()
    );

    Ok(Reconciled {
        revenue,
        quantity,
        diagnostics,
        cleaning: transactions.stats().clone(),
    })
}

pub fn reconcile_sources(
    sources: &RawSources,
    settings: &CleaningSettings,
) -> Result<Reconciled, ReconcileError> {
    reconcile(
        &sources.transactions,
        &sources.item_reference,
        &sources.combo_reference,
        settings,
    )
}
