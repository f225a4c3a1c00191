pub mod comparison_service;
pub mod context;
pub mod currency_service;
pub mod instrument_service;
pub mod market;
pub mod operations_service;
pub mod price_service;
pub mod snapshot_service;
pub mod timeseries_service;
pub mod valuation;
pub mod xirr;
