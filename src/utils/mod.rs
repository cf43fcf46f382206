pub mod clock;
pub mod dir;
pub mod logging;
pub mod runtime;
pub mod settings;
pub mod time;
