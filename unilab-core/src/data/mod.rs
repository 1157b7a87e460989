//! Data collaborators: bar feed, fundamentals, and the per-step slice.

pub mod feed;
pub mod fundamentals;
pub mod slice;

pub use feed::{DataFeed, DataRequest, EmptyFeed, FeedError, FlatFeed};
pub use fundamentals::{CoarseFundamental, FineFundamental, FundamentalSource, StaticFundamentals};
pub use slice::Slice;
