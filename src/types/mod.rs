// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Sandbox handles, runtime ids and rootfs image references.

mod handle;
mod id;
mod image_ref;

pub use handle::{Handle, HandleError};
pub use id::{ContainerId, ExecId, ImageId};
pub use image_ref::{ImageRef, ParseImageRefError, RootfsUri};
