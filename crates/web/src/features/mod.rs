pub mod audit;
pub mod entries;
pub mod sweeps;
pub mod verification;
