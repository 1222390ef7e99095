pub mod models;
pub mod services;

pub use models::AuditEvent;
pub use services::{EventSink, TracingEventSink};
