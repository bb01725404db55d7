pub mod pipeline;
pub mod request;
pub mod session;
pub mod transport;
