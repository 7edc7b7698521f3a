pub mod alarm;
pub mod config;
pub mod entity;
pub mod error;
pub mod reading;

pub use alarm::*;
pub use config::Config;
pub use entity::*;
pub use error::*;
pub use reading::*;
