pub mod http_traffic;

pub use http_traffic::{HttpTrafficProbe, TrafficHandler};
