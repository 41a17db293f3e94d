pub mod counts;
pub mod threshold;

pub use counts::AttemptCounts;
pub use threshold::filter;
