//! # Survival Classifier
//!
//! A standard scaler followed by a random forest of CART trees, chosen by
//! cross-validated grid search, evaluated on the held-out subset, and persisted
//! as a TOML artifact that the prediction service loads.

pub mod artifact;
pub mod forest;
pub mod metrics;
pub mod predict;
pub mod scaler;
pub mod search;
pub mod synthetic;
pub mod trainer;
pub mod tree;
