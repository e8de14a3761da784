pub mod client;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod protocol;
