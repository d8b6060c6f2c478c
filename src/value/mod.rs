//! Runtime values
pub mod cell;
pub mod custom;
pub mod kind;
pub mod mold;
pub mod quoted;
