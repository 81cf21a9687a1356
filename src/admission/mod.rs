//! Request admission on top of the rate limiter.
//!
//! This layer owns the rules the HTTP glue needs (which key a request is
//! metered by, how a rejection is answered, what happens when the limiter
//! fails) without depending on any web framework.

mod mode;
mod service;

pub use mode::{client_ip, Mode, UNKNOWN_CLIENT};
pub use service::{
    Admission, AdmissionService, RequestParts, FAILURE_BODY, REJECTION_BODY, RETRY_AFTER_HEADER,
    STATUS_INTERNAL_SERVER_ERROR, STATUS_TOO_MANY_REQUESTS,
};
