mod client;

pub use client::PushgatewayClient;
