pub mod cycles;
pub mod feedback;
pub mod notifications;
pub mod predictions;
pub mod users;
