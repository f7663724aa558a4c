pub mod api;
pub mod config;
pub mod error;
pub mod screen;
pub mod session;
pub mod telemetry;

pub use api::{ApiClient, Transcriber};
pub use config::{ConfigArgs, Settings};
pub use error::{ClientError, Result};
pub use screen::{AlwaysConfirm, Confirm, ResourceScreen, ResourceStore};
pub use session::{Call, CallHandle, CallServices, start_call};
