mod headers;
mod http_transport;

pub use headers::{forward_request_headers, forward_response_headers, is_hop_by_hop};
pub use http_transport::HttpTransport;
