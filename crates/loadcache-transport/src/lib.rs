//! Loadcache transport
//!
//! Asynchronous fetch jobs reporting over a single event channel, with
//! concrete fetchers for HTTP(S), `data:` and `file:` URLs and a priority
//! admission gate in front of them.

pub mod config;
pub mod data_url;
pub mod error;
pub mod fetcher;
pub mod file;
pub mod gate;
pub mod headers;
pub mod http;
pub mod job;
pub mod policy;

pub use config::TransportConfig;
pub use data_url::{DataUrl, DataUrlFetcher};
pub use error::TransportError;
pub use fetcher::{ByteStream, FetchResponse, Fetcher, SchemeFetcher, StreamingTransport};
pub use file::FileFetcher;
pub use gate::{GatePermit, PriorityGate};
pub use http::HttpFetcher;
pub use job::{
    JobEvent, JobHandle, JobId, JobMessage, JobOutcome, JobReceiver, JobSender, JobSink,
    ResponseMeta, Transport, TransportRequest,
};
pub use policy::{CachePolicy, ParseCachePolicyError};
