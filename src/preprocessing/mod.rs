//! Input normalization
//!
//! Raw loan applications are z-scored with a [`ColumnStats`] before they reach
//! any model. The statistics are explicit values handed to every call.

mod scaler;

pub use scaler::ColumnStats;
