//! Value cells, heap series and the services that edit and collect
//! them: sequence modification, context construction and binding, and
//! a mark and sweep collector with an optional reachability checker.
extern crate bitflags;
extern crate bitmaps;
extern crate itertools;
extern crate log;
extern crate ordered_float;
extern crate thiserror;

pub mod context;
pub mod error;
pub mod memory;
pub mod modify;
pub mod options;
pub mod value;

pub use error::{AllocError, CoreError, CoreResult, InvariantViolation};
pub use options::CoreOptions;
