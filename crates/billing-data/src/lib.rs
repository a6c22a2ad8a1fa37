//! Data layer for the billing dashboard.
//!
//! Discovers and reads billing workbooks, parses and validates report sheets,
//! aggregates them over a date range and per meter, forecasts the discount
//! level and shapes the results into chart series for presentation.

pub mod aggregator;
pub mod analysis;
pub mod forecast;
pub mod meters;
pub mod parser;
pub mod presenter;
pub mod reader;

pub use billing_core as core;
