pub mod bus;
pub mod marks;
pub mod recurrence;

pub use bus::{BusEvent, Subscription, SyncBus, Topic};
pub use marks::MarkSet;
pub use recurrence::{Recurrence, RecurrenceWatch};
