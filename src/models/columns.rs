//! Column names of the three source tables as they appear in the sheets.

pub mod sales {
    pub const TABLE: &str = "transactions";

    pub const STATUS: &str = "Status";
    pub const DATE: &str = "Date";
    pub const TIMESTAMP: &str = "Timestamp";
    pub const ITEM_NAME: &str = "Item Name";
    pub const INVOICE_NO: &str = "Invoice No.";
    pub const OUTLET: &str = "Outlet";
    pub const PRICE: &str = "Price";
    pub const QTY: &str = "Qty.";
    pub const SUB_TOTAL: &str = "Sub Total";
    pub const DISCOUNT: &str = "Discount";
    pub const TAX: &str = "Tax";
    pub const FINAL_TOTAL: &str = "Final Total";

    /// Always required, independent of how the sales channel is derived.
    pub const REQUIRED: [&str; 11] = [
        STATUS,
        DATE,
        TIMESTAMP,
        ITEM_NAME,
        INVOICE_NO,
        PRICE,
        QTY,
        SUB_TOTAL,
        DISCOUNT,
        TAX,
        FINAL_TOTAL,
    ];
}

pub mod item_ref {
    pub const TABLE: &str = "item_reference";

    pub const ITEM: &str = "Item";
    pub const REAL_NAME: &str = "Real Name";
    pub const PARENT: &str = "Parent";
    pub const SUB_CATEGORY: &str = "Sub Category";

    pub const REQUIRED: [&str; 4] = [ITEM, REAL_NAME, PARENT, SUB_CATEGORY];
}

pub mod combo_ref {
    pub const TABLE: &str = "combo_reference";

    pub const ITEM_NAME: &str = "Item Name";
    pub const REAL_ITEM_NAME: &str = "Real Item Name";
    pub const CATEGORY: &str = "Category";
    pub const SUB_CATEGORY: &str = "Sub Category";
    pub const MULTIPLICITY: &str = "Qty";

    pub const REQUIRED: [&str; 2] = [ITEM_NAME, REAL_ITEM_NAME];
}

/// Fallback label for unresolved categories and outlets.
pub const UNKNOWN: &str = "Unknown";
