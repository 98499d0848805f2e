pub mod classifier;
pub mod config;
pub mod connection;
pub mod engine;
pub mod ledger;
pub mod protocol;
pub mod rates;
pub mod reporter;
pub mod types;

/// StreamElements Astro WebSocket URL (real-time activity feed)
pub const ASTRO_WS_URL: &str = "wss://astro.streamelements.com";

/// Topic carrying follows, subscriptions, tips and cheers for the channel.
pub const ACTIVITIES_TOPIC: &str = "channel.activities";

/// Token type sent alongside the credential in every envelope.
pub const TOKEN_TYPE: &str = "jwt";
