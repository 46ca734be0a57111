//! Built-in plugins.

pub mod superuser;

use crate::plugin::Extension;

/// Every compiled-in extension, in load order.
pub const MANIFEST: &[Extension] = &[superuser::EXTENSION];
