use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::view_frame::cols;
use crate::models::ViewRow;

/// Consumer-side row selection over either view.
///
/// Empty lists and `None` fields place no constraint. A date range drops
/// rows whose date could not be parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewFilter {
    pub outlet: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub sales_channel: Option<String>,
    pub parent_categories: Vec<String>,
    pub sub_categories: Vec<String>,
    pub items: Vec<String>,
}

impl ViewFilter {
    pub fn outlet(mut self, outlet: impl Into<String>) -> Self {
        self.outlet = Some(outlet.into());
        self
    }

    pub fn between(mut self, from: NaiveDate, to: NaiveDate) -> Self {
        self.date_from = Some(from);
        self.date_to = Some(to);
        self
    }

    pub fn channel(mut self, channel: impl Into<String>) -> Self {
        self.sales_channel = Some(channel.into());
        self
    }

    pub fn parents<S: Into<String>>(mut self, parents: impl IntoIterator<Item = S>) -> Self {
        self.parent_categories = parents.into_iter().map(Into::into).collect();
        self
    }

    pub fn subs<S: Into<String>>(mut self, subs: impl IntoIterator<Item = S>) -> Self {
        self.sub_categories = subs.into_iter().map(Into::into).collect();
        self
    }

    pub fn items<S: Into<String>>(mut self, items: impl IntoIterator<Item = S>) -> Self {
        self.items = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == ViewFilter::default()
    }

    pub fn matches(&self, row: &ViewRow) -> bool {
        let tx = &row.transaction;

        if self.outlet.as_deref().is_some_and(|o| o != tx.outlet) {
            return false;
        }
        if self
            .sales_channel
            .as_deref()
            .is_some_and(|c| c != tx.sales_channel)
        {
            return false;
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            let Some(date) = tx.date else {
                return false;
            };
            if self.date_from.is_some_and(|from| date < from)
                || self.date_to.is_some_and(|to| date > to)
            {
                return false;
            }
        }

        selected(&self.parent_categories, &row.item.parent_category)
            && selected(&self.sub_categories, &row.item.sub_category)
            && selected(&self.items, &row.item.canonical_name)
    }

    /// The same predicate as a polars expression; `None` when unconstrained.
    pub fn to_expr(&self) -> Option<Expr> {
        let mut predicates: Vec<Expr> = Vec::new();

        if let Some(outlet) = &self.outlet {
            predicates.push(col(cols::OUTLET).eq(lit(outlet.clone())));
        }
        if let Some(channel) = &self.sales_channel {
            predicates.push(col(cols::SALES_CHANNEL).eq(lit(channel.clone())));
        }
        // ISO dates order the same as text.
        if let Some(from) = self.date_from {
            predicates.push(col(cols::DATE).gt_eq(lit(iso(from))));
        }
        if let Some(to) = self.date_to {
            predicates.push(col(cols::DATE).lt_eq(lit(iso(to))));
        }
        predicates.extend(any_of(cols::PARENT_CATEGORY, &self.parent_categories));
        predicates.extend(any_of(cols::SUB_CATEGORY, &self.sub_categories));
        predicates.extend(any_of(cols::CANONICAL_NAME, &self.items));

        predicates.into_iter().reduce(|acc, p| acc.and(p))
    }

    pub fn apply(&self, frame: &DataFrame) -> PolarsResult<DataFrame> {
        match self.to_expr() {
            Some(predicate) => frame.clone().lazy().filter(predicate).collect(),
            None => Ok(frame.clone()),
        }
    }
}

fn selected(allowed: &[String], value: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|a| a == value)
}

fn any_of(column: &str, values: &[String]) -> Option<Expr> {
    values
        .iter()
        .map(|v| col(column).eq(lit(v.clone())))
        .reduce(|acc, p| acc.or(p))
}

fn iso(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
