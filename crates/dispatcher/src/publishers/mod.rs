//! Publisher implementations that need no broker

mod log;

pub use self::log::LogPublisher;
