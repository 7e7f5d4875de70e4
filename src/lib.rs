pub(crate) mod api;
pub mod config;
pub mod error;
pub mod fc;
pub mod observability;
pub mod routing;
pub mod rules;
pub mod state;
pub mod stream;
pub mod transport;

mod util;
