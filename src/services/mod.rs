pub mod password;
pub mod session;
pub mod store;
pub mod token;

#[cfg(test)]
pub mod memory_store;
