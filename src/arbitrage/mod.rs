// =============================================================================
// Arbitrage Module
// =============================================================================
//
// Cash-and-carry arbitrage detection between ROFEX dollar futures and the
// spot dollar quotes:
//
//   1. Calendar — contract code to expiry date, days to expiry
//   2. Engine   — implied annual rate per quote, classified against the
//                 average caución funding rate

pub mod calendar;
pub mod engine;

pub use calendar::FixedClock;
pub use engine::{ArbitrageEngine, Evaluation};
