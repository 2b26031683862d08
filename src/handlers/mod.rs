mod ai;
mod contact;
mod health;
mod limits;
mod metrics;

pub use ai::{analyze_handler, chat_handler, image_handler};
pub use contact::contact_handler;
pub use health::health_handler;
pub use limits::limits_handler;
pub use metrics::metrics_handler;
