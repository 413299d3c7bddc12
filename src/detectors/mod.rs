//! Candle classification
//!
//! One classifier serves both batch analysis and live inference:
//!
//! - **Bullish engulfing**: a bullish candle whose body and volume exceed every candle in the
//!   lookback window and which closes near its high.

pub mod bullish_engulfing;
pub mod helpers;

pub use bullish_engulfing::*;
pub use helpers::*;
