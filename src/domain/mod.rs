// Domain layer - Core business models, no external dependencies
pub mod charging;
pub mod price;
pub mod query;
pub mod sample;
pub mod tariff;
