//! Best-effort push notifications for room members.
//!
//! Delivery goes through a [`PushTransport`]. The shipped transport,
//! [`LogOnlyTransport`], records what would be sent and performs no network
//! I/O: it does not sign VAPID headers or encrypt payloads. A real Web Push
//! client plugs in behind the same trait.
//!
//! Fanout is fire-and-forget. Failures are logged per subscription and never
//! reach the code path that posted the message; there is no retry queue.

pub mod cleanup;
pub mod fanout;
pub mod transport;
pub mod vapid;

pub use fanout::{FanoutReport, Notification, PushFanout};
pub use transport::{DeliveryError, LogOnlyTransport, PushTransport};
pub use vapid::VapidKeys;
