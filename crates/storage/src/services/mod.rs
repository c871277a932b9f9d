pub mod audit;
pub mod auto_miss;
pub mod entries;
pub mod notify;
pub mod outcome;
pub mod review;
pub mod verification;
