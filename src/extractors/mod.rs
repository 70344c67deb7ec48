//! Request extractors.

mod request;

pub use request::{API_VERSION_HEADER, REQUEST_ID_HEADER, USER_ID_HEADER};
