pub mod user;
pub mod price;
pub mod alert;
pub mod event;

pub use user::CurrentUser;
pub use price::{normalize_currency, PriceSample, SUPPORTED_CURRENCIES};
pub use alert::{Alert, Condition};
pub use event::{AlertTriggered, Event, PriceUpdate};
