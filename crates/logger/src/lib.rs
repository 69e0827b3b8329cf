mod rotate;
mod tracing;

pub use crate::rotate::{RotatingFileWriter, RotationConfig};
pub use crate::tracing::{init, init_with_file};
