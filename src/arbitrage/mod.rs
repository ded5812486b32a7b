pub mod normalize;
pub mod profit;

pub use normalize::{RawQuote, normalize};
pub use profit::{Decision, compute_profit, conversion_rate, cost_in_quote, select_best};
