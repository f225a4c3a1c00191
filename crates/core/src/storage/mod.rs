pub mod encryption;
#[cfg(not(target_arch = "wasm32"))]
pub mod file_store;
pub mod format;
pub mod table;
