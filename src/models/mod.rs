pub mod appointment;
pub mod service;
pub mod session;
pub mod working_hours;

pub use appointment::{Appointment, AppointmentStatus};
pub use service::{default_catalog, Service};
pub use session::{ChatSession, CollectedData, ConversationState, ConversationStep};
pub use working_hours::WorkingHours;
