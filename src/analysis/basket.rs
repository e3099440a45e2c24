use anyhow::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use super::view_frame::cols;
use crate::processor::RevenueView;

/// Invoice by canonical item presence, built from invoiced lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasketMatrix {
    invoices: Vec<String>,
    items: Vec<String>,
    /// Per invoice, the sorted indexes into `items` it contains.
    baskets: Vec<Vec<usize>>,
}

impl BasketMatrix {
    /// An item is present on an invoice when its summed quantity there is
    /// positive. Lines without an invoice number are ignored.
    pub fn from_revenue_view(view: &RevenueView) -> Self {
        let mut quantities: BTreeMap<&str, BTreeMap<&str, f64>> = BTreeMap::new();
        let mut items: BTreeSet<&str> = BTreeSet::new();

        for row in view.rows() {
            let Some(invoice) = row.transaction.invoice_no.as_deref() else {
                continue;
            };
            let item = row.item.canonical_name.as_str();
            items.insert(item);
            *quantities
                .entry(invoice)
                .or_default()
                .entry(item)
                .or_insert(0.0) += row.transaction.qty.unwrap_or(0.0);
        }

        let items: Vec<String> = items.into_iter().map(str::to_string).collect();
        let index: BTreeMap<&str, usize> = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.as_str(), i))
            .collect();

        let mut invoices = Vec::with_capacity(quantities.len());
        let mut baskets = Vec::with_capacity(quantities.len());
        for (invoice, lines) in quantities {
            invoices.push(invoice.to_string());
            baskets.push(
                lines
                    .into_iter()
                    .filter(|(_, qty)| *qty > 0.0)
                    .filter_map(|(item, _)| index.get(item).copied())
                    .collect(),
            );
        }

        BasketMatrix {
            invoices,
            items,
            baskets,
        }
    }

    pub fn invoices(&self) -> &[String] {
        &self.invoices
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn invoice_count(&self) -> usize {
        self.invoices.len()
    }

    /// Item names present on the invoice at `row`.
    pub fn basket(&self, row: usize) -> impl Iterator<Item = &str> {
        self.baskets
            .get(row)
            .into_iter()
            .flatten()
            .map(|&i| self.items[i].as_str())
    }

    pub fn contains(&self, row: usize, item: &str) -> bool {
        self.basket(row).any(|i| i == item)
    }

    /// Share of invoices containing each item, most frequent first.
    pub fn item_frequency(&self) -> Vec<(String, f64)> {
        if self.invoices.is_empty() {
            return Vec::new();
        }

        let mut counts = vec![0usize; self.items.len()];
        for basket in &self.baskets {
            for &i in basket {
                counts[i] += 1;
            }
        }

        let total = self.invoices.len() as f64;
        let mut frequency: Vec<(String, f64)> = self
            .items
            .iter()
            .zip(counts)
            .map(|(item, count)| (item.clone(), count as f64 / total))
            .collect();
        frequency.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        frequency
    }

    /// One boolean column per item beside `invoice_no`.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let mut columns = Vec::with_capacity(self.items.len() + 1);
        columns.push(Column::new(cols::INVOICE_NO.into(), self.invoices.clone()));

        for (i, item) in self.items.iter().enumerate() {
            let present: Vec<bool> = self.baskets.iter().map(|b| b.contains(&i)).collect();
            columns.push(Column::new(item.as_str().into(), present));
        }

        DataFrame::new(columns)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequentItemset {
    pub items: Vec<String>,
    pub support: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationRule {
    pub antecedents: Vec<String>,
    pub consequents: Vec<String>,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiningOutcome {
    pub itemsets: Vec<FrequentItemset>,
    pub rules: Vec<AssociationRule>,
}

/// Seam for association-rule miners fed with a basket matrix.
pub trait BasketMiner: Send + Sync {
    fn mine(&self, basket: &BasketMatrix, min_support: f64) -> Result<MiningOutcome>;
}

/// Itemsets of one and two items and the single-item rules between them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairMiner;

impl BasketMiner for PairMiner {
    fn mine(&self, basket: &BasketMatrix, min_support: f64) -> Result<MiningOutcome> {
        let total = basket.invoice_count() as f64;
        if total == 0.0 {
            return Ok(MiningOutcome::default());
        }

        let mut singles: BTreeMap<usize, usize> = BTreeMap::new();
        let mut pairs: BTreeMap<(usize, usize), usize> = BTreeMap::new();
        for items in &basket.baskets {
            for (n, &a) in items.iter().enumerate() {
                *singles.entry(a).or_insert(0) += 1;
                for &b in &items[n + 1..] {
                    *pairs.entry((a, b)).or_insert(0) += 1;
                }
            }
        }

        let support = |count: usize| count as f64 / total;
        let name = |i: usize| basket.items[i].clone();
        let frequent: BTreeMap<usize, f64> = singles
            .into_iter()
            .map(|(i, count)| (i, support(count)))
            .filter(|(_, s)| *s >= min_support)
            .collect();

        let mut itemsets: Vec<FrequentItemset> = frequent
            .iter()
            .map(|(&i, &s)| FrequentItemset {
                items: vec![name(i)],
                support: s,
            })
            .collect();
        let mut rules = Vec::new();

        for ((a, b), count) in pairs {
            let pair_support = support(count);
            let (Some(&sa), Some(&sb)) = (frequent.get(&a), frequent.get(&b)) else {
                continue;
            };
            if pair_support < min_support {
                continue;
            }
            itemsets.push(FrequentItemset {
                items: vec![name(a), name(b)],
                support: pair_support,
            });
            for (from, to, s_from, s_to) in [(a, b, sa, sb), (b, a, sb, sa)] {
                let confidence = pair_support / s_from;
                rules.push(AssociationRule {
                    antecedents: vec![name(from)],
                    consequents: vec![name(to)],
                    support: pair_support,
                    confidence,
                    lift: confidence / s_to,
                });
            }
        }

        Ok(MiningOutcome { itemsets, rules })
    }
}

/// Mines the matrix and keeps rules with lift at least `min_lift`, the
/// strongest first.
pub fn analyze_baskets(
    miner: &dyn BasketMiner,
    basket: &BasketMatrix,
    min_support: f64,
    min_lift: f64,
) -> Result<MiningOutcome> {
    let mut outcome = miner.mine(basket, min_support)?;

    outcome.rules.retain(|r| r.lift >= min_lift);
    outcome.rules.sort_by(|a, b| {
        b.lift
            .partial_cmp(&a.lift)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if outcome.rules.is_empty() {
        warn!(
            "No association rules at min_support {} and min_lift {} over {} invoices",
            min_support,
            min_lift,
            basket.invoice_count()
        );
    } else {
        info!(
            "Found {} frequent itemsets and {} association rules",
            outcome.itemsets.len(),
            outcome.rules.len()
        );
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::reconcile_sources;
    use crate::pipeline::tests::raw_sources;
    use crate::processor::CleaningSettings;

    fn matrix(baskets: &[&[&str]]) -> BasketMatrix {
        let items: BTreeSet<&str> = baskets.iter().flat_map(|b| b.iter().copied()).collect();
        let items: Vec<String> = items.into_iter().map(str::to_string).collect();
        BasketMatrix {
            invoices: (1..=baskets.len()).map(|i| i.to_string()).collect(),
            baskets: baskets
                .iter()
                .map(|b| {
                    let mut idx: Vec<usize> = b
                        .iter()
                        .filter_map(|n| items.iter().position(|i| i == n))
                        .collect();
                    idx.sort_unstable();
                    idx
                })
                .collect(),
            items,
        }
    }

    #[test]
    fn test_matrix_from_revenue_view() {
        let reconciled = reconcile_sources(&raw_sources(), &CleaningSettings::default()).unwrap();
        let basket = BasketMatrix::from_revenue_view(&reconciled.revenue);

        assert_eq!(basket.invoices(), &["1", "2", "3", "5"]);
        assert!(basket.contains(0, "Combo-A"));
        assert!(basket.contains(0, "Cold Coffee"));
        assert!(!basket.contains(1, "Cold Coffee"));

        let frequency = basket.item_frequency();
        assert_eq!(frequency[0], ("Cold Coffee".to_string(), 0.5));
    }

    #[test]
    fn test_matrix_frame_is_boolean() {
        let reconciled = reconcile_sources(&raw_sources(), &CleaningSettings::default()).unwrap();
        let df = BasketMatrix::from_revenue_view(&reconciled.revenue)
            .to_dataframe()
            .unwrap();

        assert_eq!(df.height(), 4);
        assert_eq!(df.column("Veg Momos").unwrap().dtype(), &DataType::Boolean);
        let coffee = df.column("Cold Coffee").unwrap().bool().unwrap();
        assert_eq!(coffee.num_trues(), 2);
    }

    #[test]
    fn test_pair_rules_sorted_by_lift() {
        let basket = matrix(&[
            &["Momos", "Coke"],
            &["Momos", "Coke"],
            &["Momos"],
            &["Coffee", "Cake"],
            &["Coffee"],
        ]);

        let outcome = analyze_baskets(&PairMiner, &basket, 0.01, 1.0).unwrap();

        assert!(!outcome.rules.is_empty());
        assert!(outcome.rules.windows(2).all(|w| w[0].lift >= w[1].lift));
        assert!(outcome.rules.iter().all(|r| r.lift >= 1.0));

        let coke = outcome
            .rules
            .iter()
            .find(|r| r.antecedents == ["Coke"] && r.consequents == ["Momos"])
            .unwrap();
        assert!((coke.confidence - 1.0).abs() < 1e-9);
        assert!((coke.lift - 5.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_min_support_prunes_itemsets() {
        let basket = matrix(&[&["A", "B"], &["A"], &["A"], &["C"]]);
        let outcome = analyze_baskets(&PairMiner, &basket, 0.5, 1.0).unwrap();

        assert_eq!(outcome.itemsets.len(), 1);
        assert_eq!(outcome.itemsets[0].items, vec!["A"]);
        assert!(outcome.rules.is_empty());
    }
}
