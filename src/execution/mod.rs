// Live execution module
// Market data, broker and clock seams plus the loop that drives the position machine
pub mod candle_buffer;
pub mod clock;
pub mod engine;
pub mod paper;
pub mod source;

pub use candle_buffer::CandleBuffer;
pub use clock::SessionClock;
pub use engine::{Collaborators, LiveConfig, LiveEngine};
pub use paper::{OrderExecutor, PaperBroker};
pub use source::{load_candles, write_candles, CsvCandleSource, MarketDataSource, REFRESH_LOOKBACK};
