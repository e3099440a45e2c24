pub mod aggregate;
pub mod basket;
pub mod filters;
pub mod forecast;
pub mod reports;
pub mod unit_forecast;
pub mod view_frame;

pub use aggregate::{GroupKey, Measure, aggregate};
pub use basket::*;
pub use filters::ViewFilter;
pub use forecast::*;
pub use reports::*;
pub use unit_forecast::*;
