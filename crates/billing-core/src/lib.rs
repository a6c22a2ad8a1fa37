pub mod calculations;
pub mod data_processors;
pub mod error;
pub mod formatting;
pub mod models;
pub mod profiles;
pub mod settings;
pub mod tiers;
pub mod time_utils;
