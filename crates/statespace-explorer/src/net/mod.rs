pub mod backend;
pub mod protocol;
pub mod uds;

pub use backend::HttpBackend;
pub use protocol::{LinkEvent, LinkEventKind};
pub use uds::{spawn_overview_link, OverviewLink};
