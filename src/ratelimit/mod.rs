//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod decision;
mod eviction;
mod key;
mod limiter;
mod quota;
mod store;

pub use backend::LimiterBackend;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::KeyState;
pub use decision::Decision;
pub use key::{canonical_ip, normalize_token, KeyMode};
pub use limiter::RateLimiter;
pub use quota::{Algorithm, Quota};
pub use store::{KeyStore, DEFAULT_SHARDS};
