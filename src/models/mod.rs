pub mod alert;
pub mod event;

pub use alert::{Alert, DetectionType, NewAlert};
pub use event::{AuthEvent, LoginStatus};
