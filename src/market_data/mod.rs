pub mod quote_feed;

pub use quote_feed::{FeedOutcome, FeedStatus, MarketSnapshot, QuoteFeed};
