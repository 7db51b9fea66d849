//! Client side of session authentication
//!
//! `SessionGateway` owns the current session and routes every API call,
//! renewing expired access tokens transparently. Credentials persist through a
//! `CredentialStore`; HTTP goes through a `Transport` (`ReqwestTransport` with
//! the `client` feature).

pub mod config;
pub mod error;
pub mod gateway;
pub mod renewal;
pub mod session;
pub mod storage;
pub mod transport;


pub use config::GatewayConfig;
pub use error::{GatewayError, TransportError};
pub use gateway::{SessionGateway, SessionStatus};
pub use renewal::{Admission, PendingRequest, PendingRequestQueue};
pub use session::SessionState;
pub use storage::{
    ACCESS_TOKEN_KEY, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    REFRESH_TOKEN_KEY, StorageError, StoredCredentials,
};
#[cfg(feature = "client")]
pub use transport::ReqwestTransport;
pub use transport::{ApiRequest, ApiResponse, Method, Transport};
