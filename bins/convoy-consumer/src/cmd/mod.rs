pub mod provision;
pub mod serve;
