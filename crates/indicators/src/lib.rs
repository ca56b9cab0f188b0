pub mod levels;
pub mod ma;
pub mod oscillators;
pub mod supertrend;
pub mod trend;
pub mod volatility;
pub mod volume;
pub mod vortex;

pub use trend::SmcEngine;
