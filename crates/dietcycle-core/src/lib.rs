pub mod clock;
pub mod cycle;
pub mod error;
pub mod feedback;
pub mod link;
pub mod mail;
pub mod notify;
pub mod prediction;
pub mod projection;
pub mod recommend;
pub mod regenerate;
pub mod reminder;
pub mod service;

pub use error::{CycleError, CycleResult};
