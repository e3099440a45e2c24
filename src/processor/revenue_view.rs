use std::collections::BTreeMap;
use tracing::{info, warn};

use super::reference_normalizer::ItemReference;
use super::transaction_cleaner::CleanedTransactions;
use crate::models::{Diagnostic, Transaction, ViewRow};

/// Transactions exactly as invoiced, combos kept whole.
#[derive(Debug, Clone, Default)]
pub struct RevenueView {
    rows: Vec<ViewRow>,
}

impl RevenueView {
    pub fn rows(&self) -> &[ViewRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_final(&self) -> f64 {
        self.rows
            .iter()
            .filter_map(|row| row.transaction.final_total)
            .sum()
    }
}

/// Left join of one transaction against the item reference.
pub(crate) fn enrich(transaction: &Transaction, items: &ItemReference) -> ViewRow {
    ViewRow {
        transaction: transaction.clone(),
        item: items.resolve(&transaction.item_name),
    }
}

pub struct RevenueViewBuilder;

impl RevenueViewBuilder {
    pub fn build(
        &self,
        transactions: &CleanedTransactions,
        items: &ItemReference,
    ) -> (RevenueView, Vec<Diagnostic>) {
        let mut misses: BTreeMap<&str, usize> = BTreeMap::new();

        let rows: Vec<ViewRow> = transactions
            .rows()
            .iter()
            .map(|tx| {
                if items.get(&tx.item_name).is_none() {
                    *misses.entry(tx.item_name.as_str()).or_insert(0) += 1;
                }
                enrich(tx, items)
            })
            .collect();

        if !misses.is_empty() {
            warn!(
                "{} distinct items missing from the item reference ({} rows use fallback names)",
                misses.len(),
                misses.values().sum::<usize>()
            );
        }

        let diagnostics = misses
            .into_iter()
            .map(|(item, occurrences)| Diagnostic::ReferenceMiss {
                item: item.to_string(),
                occurrences,
            })
            .collect();

        info!("Revenue view built: {} rows", rows.len());

        (RevenueView { rows }, diagnostics)
    }
}
