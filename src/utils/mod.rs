//! Utility functions and types

pub mod binary;
pub mod data_loader;
mod parallel;

pub use data_loader::{DataLoader, LOAN_FEATURE_COLUMNS, LOAN_LABEL_COLUMN, RAW_LABEL_INDEX};
pub use parallel::{reduce_with, ParallelConfig};
