//! Core TruckParts client library (session, token storage, HTTP gateway).

pub mod account;
pub mod config;
pub mod error;
pub mod gateway;
pub mod jwt;
pub mod models;
pub mod notify;
pub mod obfuscate;
pub mod session;
pub mod storage;
pub mod token_store;

pub use error::{ApiError, ApiErrorKind, ApiResult};
pub use gateway::{Gateway, RequestOptions};
pub use session::{SessionController, SessionState};
pub use token_store::TokenStore;
