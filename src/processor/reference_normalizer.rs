use polars::prelude::*;
use std::collections::HashMap;
use tracing::{info, warn};

use super::column_reader::{optional_text_column, parse_number, require_columns, text_column};
use crate::error::ReconcileError;
use crate::models::columns::{UNKNOWN, combo_ref, item_ref};
use crate::models::{ComboComponent, ItemInfo};

/// Raw item name to canonical name and categories, one entry per raw name.
#[derive(Debug, Clone, Default)]
pub struct ItemReference {
    by_item: HashMap<String, ItemInfo>,
    by_canonical: HashMap<String, ItemInfo>,
}

impl ItemReference {
    pub fn get(&self, item_name: &str) -> Option<&ItemInfo> {
        self.by_item.get(item_name)
    }

    /// First entry whose canonical name matches, used to categorise combo components.
    pub fn by_canonical(&self, canonical_name: &str) -> Option<&ItemInfo> {
        self.by_canonical.get(canonical_name)
    }

    /// Resolved info, or the fallback for unmapped names.
    pub fn resolve(&self, item_name: &str) -> ItemInfo {
        self.get(item_name)
            .cloned()
            .unwrap_or_else(|| ItemInfo::fallback(item_name))
    }

    pub fn len(&self) -> usize {
        self.by_item.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_item.is_empty()
    }
}

/// Combo name to its ordered component list.
#[derive(Debug, Clone, Default)]
pub struct ComboReference {
    combos: HashMap<String, Vec<ComboComponent>>,
}

impl ComboReference {
    pub fn is_combo(&self, item_name: &str) -> bool {
        self.combos.contains_key(item_name)
    }

    pub fn components(&self, combo_name: &str) -> Option<&[ComboComponent]> {
        self.combos.get(combo_name).map(Vec::as_slice)
    }

    pub fn combo_names(&self) -> impl Iterator<Item = &str> {
        self.combos.keys().map(String::as_str)
    }

    /// Combos registered without a single usable component row.
    pub fn empty_combos(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .combos
            .iter()
            .filter(|(_, components)| components.is_empty())
            .map(|(name, _)| name.as_str())
            .collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.combos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.combos.is_empty()
    }
}

pub struct ReferenceNormalizer;

impl ReferenceNormalizer {
    pub fn normalize_item_reference(
        &self,
        df: &DataFrame,
    ) -> Result<ItemReference, ReconcileError> {
        require_columns(df, item_ref::TABLE, &item_ref::REQUIRED)?;

        let items = text_column(df, item_ref::ITEM)?;
        let real_names = text_column(df, item_ref::REAL_NAME)?;
        let parents = text_column(df, item_ref::PARENT)?;
        let subs = text_column(df, item_ref::SUB_CATEGORY)?;

        let mut reference = ItemReference::default();
        let mut duplicates = 0;
        let mut blank_keys = 0;

        for (((item, real_name), parent), sub) in items
            .into_iter()
            .zip(real_names)
            .zip(parents)
            .zip(subs)
        {
            let Some(item) = item else {
                blank_keys += 1;
                continue;
            };

            if reference.by_item.contains_key(&item) {
                duplicates += 1;
                continue;
            }

            let info = ItemInfo {
                canonical_name: real_name.clone().unwrap_or_else(|| item.clone()),
                parent_category: parent.unwrap_or_else(|| UNKNOWN.to_string()),
                sub_category: sub.unwrap_or_else(|| UNKNOWN.to_string()),
            };

            if let Some(real_name) = real_name {
                reference
                    .by_canonical
                    .entry(real_name)
                    .or_insert_with(|| info.clone());
            }
            reference.by_item.insert(item, info);
        }

        if duplicates > 0 {
            warn!(
                "Item reference: dropped {} duplicate item rows (first occurrence kept)",
                duplicates
            );
        }
        if blank_keys > 0 {
            warn!("Item reference: skipped {} rows without an item key", blank_keys);
        }
        info!(
            "Item reference normalized: {} items, {} canonical names",
            reference.by_item.len(),
            reference.by_canonical.len()
        );

        Ok(reference)
    }

    pub fn normalize_combo_reference(
        &self,
        df: &DataFrame,
    ) -> Result<ComboReference, ReconcileError> {
        require_columns(df, combo_ref::TABLE, &combo_ref::REQUIRED)?;

        let combo_names = text_column(df, combo_ref::ITEM_NAME)?;
        let components = text_column(df, combo_ref::REAL_ITEM_NAME)?;
        let categories = optional_text_column(df, combo_ref::CATEGORY)?;
        let subs = optional_text_column(df, combo_ref::SUB_CATEGORY)?;
        let multiplicities = optional_text_column(df, combo_ref::MULTIPLICITY)?;

        let mut reference = ComboReference::default();
        let mut blank_components = 0;
        let mut bad_multiplicity = 0;

        for ((((combo, component), category), sub), multiplicity) in combo_names
            .into_iter()
            .zip(components)
            .zip(categories)
            .zip(subs)
            .zip(multiplicities)
        {
            let Some(combo) = combo else {
                continue;
            };

            let entry = reference.combos.entry(combo).or_default();

            let Some(canonical_name) = component else {
                blank_components += 1;
                continue;
            };

            let multiplicity = match multiplicity.as_deref().map(parse_number) {
                None => 1.0,
                Some(Some(m)) if m > 0.0 => m,
                Some(_) => {
                    bad_multiplicity += 1;
                    1.0
                }
            };

            entry.push(ComboComponent {
                canonical_name,
                category_hint: category,
                sub_category_hint: sub,
                multiplicity,
            });
        }

        if blank_components > 0 {
            warn!("Combo reference: ignored {} rows without a component name", blank_components);
        }
        if bad_multiplicity > 0 {
            warn!(
                "Combo reference: {} component multiplicities were not positive numbers, using 1",
                bad_multiplicity
            );
        }
        for combo in reference.empty_combos() {
            warn!("Combo reference: '{}' has no components", combo);
        }
        info!("Combo reference normalized: {} combos", reference.combos.len());

        Ok(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_frame() -> DataFrame {
        df! {
            "Item" => &["Veg Momo", "Veg Momo", "Cold Coffee", "Mystery"],
            "Real Name" => &[Some("Veg Momos"), Some("Duplicate Momos"), Some("Cold Coffee"), None],
            "Parent" => &[Some("Food"), Some("Drinks"), Some("Beverages"), None],
            "Sub Category" => &[Some("Momos"), Some("Other"), None, None],
        }
        .unwrap()
    }

    #[test]
    fn test_item_reference_first_wins() {
        let reference = ReferenceNormalizer.normalize_item_reference(&item_frame()).unwrap();

        assert_eq!(reference.len(), 3);
        let momo = reference.get("Veg Momo").unwrap();
        assert_eq!(momo.canonical_name, "Veg Momos");
        assert_eq!(momo.parent_category, "Food");
        assert!(reference.by_canonical("Duplicate Momos").is_none());
    }

    #[test]
    fn test_item_reference_fills_blank_fields() {
        let reference = ReferenceNormalizer.normalize_item_reference(&item_frame()).unwrap();

        let coffee = reference.get("Cold Coffee").unwrap();
        assert_eq!(coffee.sub_category, "Unknown");

        let mystery = reference.get("Mystery").unwrap();
        assert_eq!(mystery.canonical_name, "Mystery");
        assert_eq!(mystery.parent_category, "Unknown");
    }

    #[test]
    fn test_fallback_is_deterministic() {
        let reference = ReferenceNormalizer.normalize_item_reference(&item_frame()).unwrap();

        let first = reference.resolve("Paneer Roll");
        let second = reference.resolve("Paneer Roll");
        assert_eq!(first, second);
        assert_eq!(first, ItemInfo::fallback("Paneer Roll"));
        assert_eq!(first.parent_category, "Unknown");
        assert_eq!(first.sub_category, "Unknown");
    }

    #[test]
    fn test_combo_reference_components_and_multiplicity() {
        let df = df! {
            "Item Name" => &["Combo-A", "Combo-A", "Combo-B", "Combo-Z"],
            "Real Item Name" => &[Some("Item-X"), Some("Item-Y"), Some("Item-X"), None],
            "Category" => &[Some("Food"), None, None, None],
            "Sub Category" => &[None::<&str>, None, None, None],
            "Qty" => &[Some("2"), None, Some("zero"), None],
        }
        .unwrap();

        let reference = ReferenceNormalizer.normalize_combo_reference(&df).unwrap();

        assert_eq!(reference.len(), 3);
        let combo_a = reference.components("Combo-A").unwrap();
        assert_eq!(combo_a.len(), 2);
        assert_eq!(combo_a[0].canonical_name, "Item-X");
        assert_eq!(combo_a[0].multiplicity, 2.0);
        assert_eq!(combo_a[0].category_hint.as_deref(), Some("Food"));
        assert_eq!(combo_a[1].multiplicity, 1.0);

        assert_eq!(reference.components("Combo-B").unwrap()[0].multiplicity, 1.0);

        assert!(reference.is_combo("Combo-Z"));
        assert_eq!(reference.empty_combos(), vec!["Combo-Z"]);
        assert!(reference.components("Veg Momo").is_none());
    }

    #[test]
    fn test_combo_reference_requires_columns() {
        let df = df! {
            "Item Name" => &["Combo-A"],
        }
        .unwrap();

        let err = ReferenceNormalizer.normalize_combo_reference(&df).unwrap_err();
        assert!(matches!(err, ReconcileError::MissingColumns { .. }));
    }
}
