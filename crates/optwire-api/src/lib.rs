// optwire-api: named backend APIs, lazy directory resolution, and a
// request dispatcher with pluggable authentication hooks.

pub mod auth;
pub mod call;
pub mod client;
pub mod directory;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod transport;

pub use auth::{AuthContext, Authenticator, HeaderAuth, NoAuth, TokenExchange};
pub use call::{ApiCall, CallResult};
pub use client::{ApiClient, ApiFlavor, ResolutionState};
pub use directory::{Directory, DirectoryEntries};
pub use envelope::{
    Params, RequestEnvelope, RequestOptions, ResponseEnvelope, TransportRequest, Verb,
    scalar_to_string,
};
pub use error::Error;
pub use registry::{ApiDescriptor, ApiHandle, ApiRegistry, ClientFactory, FactoryContext};
pub use transport::{HttpTransport, TlsMode, Transport, TransportConfig};
