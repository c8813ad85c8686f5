/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Switches for taint tracking as a whole and for individual taint sources
//! and sinks.
//!
//! Preferences use the flat names of the browser preference store:
//!
//! ```json
//! {
//!     "tainting.active": true,
//!     "tainting.source.location.hash": false,
//!     "tainting.sink.eval": true
//! }
//! ```
//!
//! Anything that is not configured is enabled.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PREF_ACTIVE: &str = "tainting.active";
pub const PREF_SOURCE_PREFIX: &str = "tainting.source.";
pub const PREF_SINK_PREFIX: &str = "tainting.sink.";

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TaintingPrefs {
    active: bool,
    sources: BTreeMap<String, bool>,
    sinks: BTreeMap<String, bool>,
}

impl Default for TaintingPrefs {
    fn default() -> Self {
        TaintingPrefs {
            active: true,
            sources: BTreeMap::new(),
            sinks: BTreeMap::new(),
        }
    }
}

impl TaintingPrefs {
    /// Reads a JSON object of preference names to booleans. Values that are
    /// not booleans and names that do not belong to taint tracking are
    /// skipped.
    pub fn from_json(json: &str) -> Result<TaintingPrefs, serde_json::Error> {
        let map: Map<String, Value> = serde_json::from_str(json)?;
        let mut prefs = TaintingPrefs::default();
        for (name, value) in map.iter() {
            match value.as_bool() {
                Some(enabled) => {
                    if !prefs.set_pref(name, enabled) {
                        debug!("Ignoring unrelated preference {name:?}");
                    }
                },
                None => warn!("Ignoring non-boolean preference value for {name:?}"),
            }
        }
        Ok(prefs)
    }

    /// Sets a preference by its full name. Returns false if `name` is not a
    /// tainting preference.
    pub fn set_pref(&mut self, name: &str, enabled: bool) -> bool {
        if name == PREF_ACTIVE {
            self.set_active(enabled);
        } else if let Some(source) = name.strip_prefix(PREF_SOURCE_PREFIX) {
            self.set_source_enabled(source, enabled);
        } else if let Some(sink) = name.strip_prefix(PREF_SINK_PREFIX) {
            self.set_sink_enabled(sink, enabled);
        } else {
            return false;
        }
        true
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn set_source_enabled(&mut self, name: &str, enabled: bool) {
        self.sources.insert(name.to_owned(), enabled);
    }

    pub fn set_sink_enabled(&mut self, name: &str, enabled: bool) {
        self.sinks.insert(name.to_owned(), enabled);
    }

    /// Whether data from the source `name` should be tainted.
    pub fn is_source_active(&self, name: &str) -> bool {
        self.active && self.sources.get(name).copied().unwrap_or(true)
    }

    /// Whether tainted data reaching the sink `name` should be reported.
    pub fn is_sink_active(&self, name: &str) -> bool {
        self.active && self.sinks.get(name).copied().unwrap_or(true)
    }
}
