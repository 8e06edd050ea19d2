// SPDX-License-Identifier: GPL-3.0-only
pub mod traits;
pub mod http;

pub use traits::{FetchStatus, Transport, TransportError};
pub use http::HttpTransport;
