pub mod status;

pub use status::{BoxError, StatusChecks, StatusResponse, status};
