//! Default price catalog shipped with the build
//!
//! Keys must match the labels listed in the classifier's metadata exactly.

use crate::models::{PriceRecord, PriceTable};

pub fn default_catalog() -> PriceTable {
    [
        (
            "Hollandia Evap 120g",
            PriceRecord::new("Hollandia Evaporated Milk (120g)", "₦500").with_category("Dairy"),
        ),
        (
            "Beloxxi Cream cracker",
            PriceRecord::new("Beloxxi Cream Crackers", "₦50").with_category("Snacks"),
        ),
        (
            "Hollandia 50g",
            PriceRecord::new("Hollandia Evaporated Milk (50g)", "₦250").with_category("Dairy"),
        ),
        (
            "three crown triangle",
            PriceRecord::new("Three Crowns Milk (Sachet)", "₦300").with_category("Dairy"),
        ),
        (
            "Class 1",
            PriceRecord::new("Generic Item", "₦0.00").with_category("Unknown"),
        ),
    ]
    .into_iter()
    .map(|(label, record)| (label.to_string(), record))
    .collect()
}
