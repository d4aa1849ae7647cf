pub mod channel;
mod service;

pub use channel::ChannelPhase;
pub use service::ServiceState;
