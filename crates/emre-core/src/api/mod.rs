//! Request execution against the EmRe REST API.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod filters;
pub mod operation;
pub mod transport;

pub use client::{ApiClient, DEFAULT_BASE_URL};
pub use endpoints::{Mutation, Query};
pub use error::{FieldError, RequestError};
pub use filters::{Args, HistoryRange, IncidentFilter, OrganizationFilter, ResourceFilter};
pub use operation::{Contents, Method, Operation, Payload, Shape};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
