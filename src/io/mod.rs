//! Filesystem helpers shared by the registry and the content store.

mod atomic;

pub use atomic::{is_temp_name, read_optional, temp_path, write_atomic, write_atomic_with, TEMP_SUFFIX};
