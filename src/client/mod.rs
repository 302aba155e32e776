//! The HTTP client: configuration, transport, request execution, document
//! operations, and change feeds.
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── config     - CouchConfig connection context
//! ├── transport  - Transport trait, reqwest implementation, wire types
//! ├── response   - status classification and body decoding
//! ├── documents  - CouchClient and the document operations
//! └── changes    - changes builder and the continuous feed consumer
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CouchClient`] | Client for one database |
//! | [`CouchConfig`] | Immutable connection context |
//! | [`Transport`] | Injectable HTTP execution capability |
//! | [`Changes`] | Changes request builder |
//! | [`ContinuousChanges`] | Long-lived feed consumer |

pub mod changes;
pub mod config;
pub mod documents;
pub(crate) mod response;
pub mod transport;

pub use changes::{Changes, ChangesStream, ContinuousChanges, StopHandle};
pub use config::CouchConfig;
pub use documents::CouchClient;
pub use transport::{
    ByteStream, HttpRequest, HttpTransport, RawResponse, RequestBody, Transport,
};
