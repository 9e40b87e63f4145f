//! Standard libraries of the host

pub mod core;
pub mod tasks;

use parking_lot::Mutex;
use std::sync::Arc;

use super::{Library, CORE_LIBRARY, DYNAMIC_LIBRARY, TASKS_LIBRARY};
use crate::runtime::Exception;

/// Captured `print` output, one entry per call
pub type OutputSink = Arc<Mutex<Vec<String>>>;

/// `runtime.core` printing to stdout
pub fn core() -> Library {
    let mut library = Library::new(CORE_LIBRARY);
    self::core::register(&mut library, None);
    library
}

/// `runtime.core` with `print` writing into `sink` instead of stdout
pub fn core_with_output(sink: OutputSink) -> Library {
    let mut library = Library::new(CORE_LIBRARY);
    self::core::register(&mut library, Some(sink));
    library
}

/// `runtime.tasks`
pub fn tasks() -> Library {
    let mut library = Library::new(TASKS_LIBRARY);
    self::tasks::register(&mut library);
    library
}

/// `runtime.dynamic`: no functions; its presence enables dynamic binding
pub fn dynamic() -> Library {
    Library::new(DYNAMIC_LIBRARY)
}

pub(crate) fn arg_count(name: &str, expected: &str, got: usize) -> Exception {
    Exception::of(
        crate::runtime::ExceptionKind::ArgumentError,
        format!("{} expects {} argument(s), got {}", name, expected, got),
    )
}
