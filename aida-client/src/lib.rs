pub mod client;
pub mod handle;

pub use client::{Client, ClientConfig, SignalEvent, Subscription};
pub use handle::{type_list_digest, RemoteHandle};
