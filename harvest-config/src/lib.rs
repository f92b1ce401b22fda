//! Configuration for the event harvest core.
//!
//! Each event type has a capacity and an enabled flag. Both may change while the process runs:
//! the aggregators read `enabled` on every record and re-read the capacity lazily at the next
//! harvest. Use a [`LiveConfig`] to share and replace the configuration at runtime.
//!
//! ```
//! use harvest_config::{Config, EventType, LiveConfig};
//!
//! let config = Config::from_yaml_str("events: {error: {max_samples_stored: 50}}").unwrap();
//! let live = LiveConfig::new(config);
//!
//! assert_eq!(live.load().events.capacity(EventType::Error), 50);
//! ```
#![warn(missing_docs)]

mod config;
mod events;
mod live;

pub use self::config::*;
pub use self::events::*;
pub use self::live::*;
