pub mod deploy;
pub mod validate;
pub mod vault;
