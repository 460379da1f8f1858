// ABOUTME: Node container runtime seam and its Docker-compatible implementation.
// ABOUTME: Pulls images, loads pod role tasks, and runs processes inside them.

mod bollard;
mod traits;

pub use self::bollard::BollardEngine;
pub use traits::*;
