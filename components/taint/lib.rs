/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! Taint tracking for string data.
//!
//! Every tainted string carries a [`StringTaint`]: a sorted list of
//! [`TaintRange`]s, each tagging a part of the string with a [`TaintFlow`].
//! A flow is the history of that part, from the [`TaintOperation`] that
//! introduced it (its source) to the last operation that touched it. Flows
//! are paths through a shared, reference counted DAG of [`TaintNode`]s, so
//! copying, slicing and concatenating strings never copies histories.
//!
//! Host string types embed a [`StringTaint`] and implement
//! [`TaintableString`]; [`TaintedString`] is a complete example that keeps
//! taint in step with every mutation of a Rust `String`.

pub mod dot;
mod flow;
pub mod interchange;
pub mod marking;
mod operation;
pub mod prefs;
mod range;
pub mod report;
mod string_taint;
mod taintable;

pub use crate::flow::{FlowIter, TaintFlow, TaintNode, WeakTaintFlow};
pub use crate::operation::{TaintLocation, TaintOperation, TaintSource};
pub use crate::range::{
    OCTET_WIDTH, SEXTET_WIDTH, TaintRange, convert_base_begin, convert_base_end,
};
pub use crate::string_taint::StringTaint;
pub use crate::taintable::{DecodeError, TaintList, TaintableString, TaintedString};
