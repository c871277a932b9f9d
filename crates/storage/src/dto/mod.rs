pub mod audit;
pub mod entry;
pub mod sweep;
pub mod verification;
