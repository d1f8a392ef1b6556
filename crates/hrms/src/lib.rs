//! Client for the external leave management service.
//!
//! The orchestration layer talks to the system of record only through the
//! [`LeaveService`] trait; the HTTP implementation lives here and every
//! transport failure is folded into the small [`LeaveServiceError`] set.

pub mod http;
pub mod service;

pub use http::HttpLeaveService;
pub use service::{with_retry, LeaveApplicationReceipt, LeaveService, LeaveServiceError};
