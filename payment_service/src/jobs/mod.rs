pub mod ach_verification;
pub mod pool_monitor;
