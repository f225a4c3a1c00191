pub mod traits;

// Broker implementations
pub mod tinvest;
