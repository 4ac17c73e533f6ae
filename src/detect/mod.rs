//! Page classifiers: anti-bot interstitials and out-of-stock phrasing.

mod availability;
mod block;

pub use availability::{is_available, out_of_stock_phrase, OUT_OF_STOCK_PHRASES};
pub use block::{detect_block, BlockVerdict, BLOCK_PHRASES, BLOCK_SCAN_CHARS};
