pub mod credentials;
pub mod transport;

pub use credentials::CredentialSource;
pub use transport::HttpTransport;
