//! Domain types: bars, the OHLCV frame, and completed trades.

pub mod bar;
pub mod frame;
pub mod trade;

pub use bar::Bar;
pub use frame::{FrameError, OhlcvColumns, OhlcvFrame};
pub use trade::{ExitReason, Trade};
