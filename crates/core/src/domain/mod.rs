pub mod chain;
pub mod request;
pub mod step;
