pub mod bytes;
pub mod duration;
