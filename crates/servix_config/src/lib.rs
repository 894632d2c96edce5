mod global;
mod http;
mod server;
mod servix;
mod validation;

pub use global::GlobalConfig;
pub use http::HttpConfig;
pub use server::ServerConfig;
pub use servix::ServixConfig;
pub use validation::{ConfigReport, validate};
