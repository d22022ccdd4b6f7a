pub mod bar_cache;
pub mod expiry_calendar;
pub mod gateway;
pub mod rate_limiter;
pub mod resolver;
pub mod session;
pub mod trading_hours;

pub use bar_cache::{BarCache, BarKey, Lookup, SeriesKey};
pub use expiry_calendar::ExpiryCalendar;
pub use gateway::{ContractListing, GatewayClient, HistoricalSource, HistoryRequest};
pub use rate_limiter::SharedRateLimiter;
pub use resolver::Resolver;
pub use session::{MarketSession, SessionConfig, SessionStats};
pub use trading_hours::{cache_max_age, filter_rth, rth_session, session_seconds};
