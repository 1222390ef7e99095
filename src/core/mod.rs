pub mod clock;
pub mod currency;
pub mod error;
pub mod timezone;

pub use clock::{Clock, FixedClock, SystemClock};
pub use currency::{check_money_scale, round_money, Currency};
pub use error::{AppError, Result};
