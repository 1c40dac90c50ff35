pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod middleware;
pub mod routes;
pub mod user;
pub mod utils;

pub use error::HttpError;
pub use user::CognitoUser;
