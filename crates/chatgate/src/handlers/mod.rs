//! HTTP request handlers.

mod health;
mod messages;
pub(crate) mod response;
mod status;
mod version;

pub use health::{livez, readyz};
pub use messages::{clear_duplicates, send_message};
pub use status::{index, status};
pub use version::{VERSION, version};
