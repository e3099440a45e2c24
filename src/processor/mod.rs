pub mod column_reader;
pub mod quantity_view;
pub mod reference_normalizer;
pub mod revenue_view;
pub mod transaction_cleaner;

pub use quantity_view::*;
pub use reference_normalizer::*;
pub use revenue_view::*;
pub use transaction_cleaner::*;
