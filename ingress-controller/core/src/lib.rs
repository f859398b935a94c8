//! Controller-independent vocabulary shared by the reconciliation engine.
//!
//! Nothing in this crate talks to the cluster. It holds the rules that every store applies the same
//! way: which of two objects wins a contested slot, how a batch of changes is collapsed before it is
//! handed to the renderer, and how `namespace/name` references are resolved.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod change;
mod key;
mod wins;


pub use self::{
    change::{squash, Change, KeyWithKind, Op},
    key::{ns_name, object_key, qualify, split_reference},
    wins::wins,
};
