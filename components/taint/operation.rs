/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Records of the actions that produce or transform tainted data.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The place in script where an operation was performed.
#[derive(Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct TaintLocation {
    filename: String,
    line: u32,
    pos: u32,
    function: String,
}

impl TaintLocation {
    pub fn new(filename: impl Into<String>, line: u32, pos: u32, function: impl Into<String>) -> Self {
        TaintLocation {
            filename: filename.into(),
            line,
            pos,
            function: function.into(),
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    /// The column inside of `line`.
    pub fn pos(&self) -> u32 {
        self.pos
    }

    /// The name of the enclosing function, empty for top-level code.
    pub fn function(&self) -> &str {
        &self.function
    }
}

impl fmt::Display for TaintLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.function.is_empty() {
            write!(f, "{}:{}:{}", self.filename, self.line, self.pos)
        } else {
            write!(
                f,
                "{} ({}:{}:{})",
                self.function, self.filename, self.line, self.pos
            )
        }
    }
}

/// An operation performed on tainted data, e.g. `substring`, `concat` or the
/// name of a DOM API that introduced the data in the first place.
///
/// Operations are built once, using the consuming builder methods, and then
/// stored inside of a [`TaintNode`](crate::TaintNode). They are never
/// modified afterwards, which is what makes it safe to share nodes between
/// any number of flows.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TaintOperation {
    name: Cow<'static, str>,
    arguments: Vec<String>,
    location: Option<TaintLocation>,
    is_source: bool,
    is_native: bool,
}

/// Operations at taint sources are plain operations with the source flag set.
pub type TaintSource = TaintOperation;

impl TaintOperation {
    /// Constructs an operation without any arguments.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        TaintOperation {
            name: name.into(),
            arguments: Vec::new(),
            location: None,
            is_source: false,
            is_native: false,
        }
    }

    pub fn with_arguments<I, S>(name: impl Into<Cow<'static, str>>, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TaintOperation {
            arguments: arguments.into_iter().map(Into::into).collect(),
            ..TaintOperation::new(name)
        }
    }

    pub fn with_location(mut self, location: TaintLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Marks this operation as triggered by the engine itself rather than
    /// by script.
    pub fn native(mut self) -> Self {
        self.is_native = true;
        self
    }

    /// Marks this operation as the origin of tainted data.
    pub fn source(mut self) -> Self {
        self.is_source = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn location(&self) -> Option<&TaintLocation> {
        self.location.as_ref()
    }

    pub fn is_source(&self) -> bool {
        self.is_source
    }

    pub fn is_native(&self) -> bool {
        self.is_native
    }
}

impl From<&'static str> for TaintOperation {
    fn from(name: &'static str) -> Self {
        TaintOperation::new(name)
    }
}

impl fmt::Display for TaintOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (index, argument) in self.arguments.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{argument:?}")?;
        }
        f.write_str(")")?;
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        Ok(())
    }
}
