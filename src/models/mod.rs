pub mod assignment;
pub mod distributor;
pub mod location;
pub mod performance;
