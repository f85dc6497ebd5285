pub mod client;
pub mod domain;
pub mod types;

pub use client::{HttpClient, Transport};
pub use domain::{DomainApi, Submitted};
pub use types::{Request, Response, ResponseKind};
