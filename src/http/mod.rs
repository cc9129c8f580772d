pub(crate) mod envelope;
pub(crate) mod request;
pub(crate) mod response;

pub use envelope::{Envelope, ErrorMessage, Page, ResponseStatus};
pub use request::{Body, Method, Request};
pub use response::Response;
