mod monitor;

pub mod positions;
pub mod timing;
pub mod waitlist;

pub use positions::PositionBook;
pub use timing::{check_entry_timing, EntryTiming};
pub use waitlist::{EntryWaitlist, PRICE_TOLERANCE};
