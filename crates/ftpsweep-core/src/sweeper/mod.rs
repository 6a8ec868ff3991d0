mod service;
pub mod sweep;

pub use service::SweepService;
pub use sweep::{connect, is_expired, sweep_once, SweepReport};
