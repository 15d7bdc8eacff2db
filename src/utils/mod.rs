mod logging;
mod other;

pub use logging::init_log;
pub use other::{HandyMutex, HandyRwLock};
