use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::reference_normalizer::{ComboReference, ItemReference};
use super::revenue_view::enrich;
use super::transaction_cleaner::CleanedTransactions;
use crate::models::columns::UNKNOWN;
use crate::models::{ComboComponent, Diagnostic, ItemInfo, QuantityRow, Transaction, ViewRow};

/// Component-level unit consumption: combos exploded into their components.
#[derive(Debug, Clone, Default)]
pub struct QuantityView {
    rows: Vec<QuantityRow>,
}

impl QuantityView {
    pub fn rows(&self) -> &[QuantityRow] {
        &self.rows
    }

    pub fn view_rows(&self) -> impl Iterator<Item = &ViewRow> {
        self.rows.iter().map(|q| &q.row)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn total_qty(&self) -> f64 {
        self.rows
            .iter()
            .filter_map(|q| q.row.transaction.qty)
            .sum()
    }
}

/// Categories for a combo component: the item reference by canonical name
/// first, then the combo row's own hints, with the component name standing
/// in for a missing sub-category.
pub(crate) fn resolve_component(component: &ComboComponent, items: &ItemReference) -> ItemInfo {
    if let Some(info) = items.by_canonical(&component.canonical_name) {
        return ItemInfo {
            canonical_name: component.canonical_name.clone(),
            parent_category: info.parent_category.clone(),
            sub_category: info.sub_category.clone(),
        };
    }

    ItemInfo {
        canonical_name: component.canonical_name.clone(),
        parent_category: component
            .category_hint
            .clone()
            .unwrap_or_else(|| UNKNOWN.to_string()),
        sub_category: component
            .sub_category_hint
            .clone()
            .unwrap_or_else(|| component.canonical_name.clone()),
    }
}

fn explode_component(
    transaction: &Transaction,
    component: &ComboComponent,
    items: &ItemReference,
) -> QuantityRow {
    let mut exploded = transaction.clone();
    exploded.qty = transaction.qty.map(|qty| qty * component.multiplicity);

    QuantityRow {
        row: ViewRow {
            transaction: exploded,
            item: resolve_component(component, items),
        },
        is_combo_component: true,
    }
}

pub struct QuantityViewBuilder;

impl QuantityViewBuilder {
    pub fn build(
        &self,
        transactions: &CleanedTransactions,
        items: &ItemReference,
        combos: &ComboReference,
    ) -> (QuantityView, Vec<Diagnostic>) {
        let (combo_sales, plain_sales): (Vec<&Transaction>, Vec<&Transaction>) = transactions
            .rows()
            .iter()
            .partition(|tx| combos.is_combo(&tx.item_name));

        debug!(
            "Partitioned {} transactions: {} standalone, {} combo",
            transactions.len(),
            plain_sales.len(),
            combo_sales.len()
        );

        let mut rows: Vec<QuantityRow> = plain_sales
            .iter()
            .map(|tx| QuantityRow {
                row: enrich(tx, items),
                is_combo_component: false,
            })
            .collect();

        let mut faults: BTreeMap<&str, usize> =
            combos.empty_combos().into_iter().map(|combo| (combo, 0)).collect();
        for tx in &combo_sales {
            if combos.components(&tx.item_name).is_none_or(<[_]>::is_empty) {
                *faults.entry(tx.item_name.as_str()).or_insert(0) += 1;
            }
        }

        let exploded: Vec<QuantityRow> = combo_sales
            .iter()
            .flat_map(|tx| {
                combos
                    .components(&tx.item_name)
                    .unwrap_or_default()
                    .iter()
                    .map(move |component| explode_component(tx, component, items))
            })
            .collect();

        info!(
            "Exploded {} combo sales into {} component rows",
            combo_sales.len() - faults.values().sum::<usize>(),
            exploded.len()
        );
        rows.extend(exploded);

        let diagnostics: Vec<Diagnostic> = faults
            .into_iter()
            .map(|(combo, transactions)| {
                warn!(
                    "combo-integrity fault: '{}' has no components ({} sales left out)",
                    combo, transactions
                );
                Diagnostic::ComboIntegrityFault {
                    combo: combo.to_string(),
                    transactions,
                }
            })
            .collect();

        info!("Quantity view built: {} rows", rows.len());

        (QuantityView { rows }, diagnostics)
    }
}
