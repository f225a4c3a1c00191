pub mod account;
pub mod clock;
pub mod comparison;
pub mod instrument;
pub mod money;
pub mod operation;
pub mod price;
pub mod remap;
pub mod report;
pub mod settings;
