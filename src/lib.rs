//! `netservice-http` is an async client-side engine for calling a JSON backend.
//!
//! Each API operation is a [`RequestKind`] registered in a [`RouteRegistry`]
//! with its route template, HTTP method and retry budget. [`HttpService`]
//! resolves the route, applies the [`WrapPolicy`], retries connection-level
//! failures and hands the decoded result to the kind's [`Processor`]:
//! - [`HttpService::send`] / [`HttpService::send_with`]
//! - [`DownloadManager::download_to_file`]
//! - [`DownloadManager::download_to_memory`]

mod client;
mod config;
mod dispatch;
mod download;
mod error;
mod local_data;
mod params;
mod retry;
mod route;
mod socket;
mod state;
mod transport;
mod types;
mod wire;
mod wrap;

pub use client::{CallOptions, HttpService, CLIENT_VERSION_HEADER};
pub use config::NetworkConfig;
pub use dispatch::{NoopProcessor, Processor};
pub use download::{DownloadManager, DownloadProgress};
pub use error::{NetworkError, TransportFaultKind};
pub use local_data::{LocalData, NoLocalData};
pub use params::encode_query;
pub use route::{HttpMethod, RequestDescriptor, RequestKind, RouteRegistry, RouteRegistryBuilder};
pub use socket::{SocketService, SocketStatus};
pub use state::ConnectionState;
pub use transport::{
    FragmentSink, HttpRequest, HttpResponse, ReqwestTransport, TerminalState, Transport,
};
pub use types::{CallOutcome, ServerFailure};
pub use wire::ErrorResponse;
pub use wrap::WrapPolicy;

pub type Result<T> = std::result::Result<T, NetworkError>;
