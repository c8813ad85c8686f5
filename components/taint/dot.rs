/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Graphviz dumps of the provenance graph behind a string's taint.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::flow::{TaintNode, node_address};
use crate::operation::TaintOperation;
use crate::string_taint::StringTaint;

/// Arguments beyond this are left out of node labels.
const MAX_LABEL_ARGUMENTS: usize = 2;

/// Writes the taint ranges of a string and every node reachable from them
/// as a dot graph. Nodes shared between flows are written once, edges point
/// from a node to its parent.
pub fn write_dot(taint: &StringTaint, output: &mut impl Write) -> io::Result<()> {
    let mut ids: HashMap<usize, usize> = HashMap::new();

    writeln!(output, "digraph taint {{")?;
    writeln!(output, "  node [shape=box];")?;
    for (index, range) in taint.iter().enumerate() {
        writeln!(
            output,
            "  range{index} [shape=ellipse, label=\"[{}, {})\"];",
            range.begin(),
            range.end()
        )?;

        let mut child: Option<usize> = None;
        for node in range.flow() {
            let next_id = ids.len();
            let mut seen = true;
            let id = *ids.entry(node_address(node)).or_insert_with(|| {
                seen = false;
                next_id
            });

            match child {
                Some(child) => writeln!(output, "  node{child} -> node{id};")?,
                None => writeln!(output, "  range{index} -> node{id};")?,
            }
            if seen {
                // The rest of this chain has been written already.
                break;
            }
            writeln!(output, "  node{id} [label=<{}>];", label(node))?;
            child = Some(id);
        }
    }
    writeln!(output, "}}")
}

/// Writes the graph of `taint` to `<directory>/<address>.dot`, where the
/// address is the one of the first taint range.
///
/// This is a best effort debugging aid: failures are logged and the path of
/// the written file is only returned on success.
pub fn dump(taint: &StringTaint, directory: &Path) -> Option<PathBuf> {
    let first = taint.ranges().first()?;
    let path = directory.join(format!("{first:p}.dot"));

    let result = fs::create_dir_all(directory)
        .and_then(|_| File::create(&path))
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write_dot(taint, &mut writer)?;
            writer.flush()
        });
    match result {
        Ok(()) => {
            debug!("Wrote taint graph to {}", path.display());
            Some(path)
        },
        Err(error) => {
            warn!("Could not write taint graph to {}: {error}", path.display());
            None
        },
    }
}

fn label(node: &TaintNode) -> String {
    let operation: &TaintOperation = node.operation();
    let mut label = String::new();
    escape_into(operation.name(), &mut label);
    for argument in operation.arguments().iter().take(MAX_LABEL_ARGUMENTS) {
        label.push_str("<br/>");
        escape_into(argument, &mut label);
    }
    if let Some(location) = operation.location() {
        label.push_str("<br/>");
        escape_into(&location.to_string(), &mut label);
    }
    label
}

/// Escapes text for an HTML-like dot label. Line breaks, including escaped
/// ones, become `<br/>`; characters outside of printable ASCII are written
/// as `\xNN` or `\uNNNN`.
fn escape_into(text: &str, output: &mut String) {
    output.reserve(text.len());
    let mut chars = text.chars().peekable();
    while let Some(character) = chars.next() {
        match character {
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '\n' => output.push_str("<br/>"),
            '\t' => output.push_str("\\t"),
            '\\' if chars.peek() == Some(&'n') => {
                chars.next();
                output.push_str("<br/>");
            },
            ' '..='~' => output.push(character),
            c if u32::from(c) <= 0xff => output.push_str(&format!("\\x{:02x}", u32::from(c))),
            c => output.push_str(&format!("\\u{:04x}", u32::from(c))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escaped(text: &str) -> String {
        let mut output = String::new();
        escape_into(text, &mut output);
        output
    }

    #[test]
    fn escapes_label_text() {
        assert_eq!(escaped("a<b> & \"c\""), "a&lt;b&gt; &amp; &quot;c&quot;");
        assert_eq!(escaped("one\ntwo\\nthree"), "one<br/>two<br/>three");
        assert_eq!(escaped("tab\there"), "tab\\there");
        assert_eq!(escaped("\u{7f}é€"), "\\x7f\\xe9\\u20ac");
        assert_eq!(escaped("C:\\dir"), "C:\\dir");
    }

    #[test]
    fn label_lists_two_arguments_at_most() {
        let flow = crate::TaintFlow::new(TaintOperation::with_arguments("f", ["1", "2", "3"]));
        let node = flow.head().unwrap();
        assert_eq!(label(node), "f<br/>1<br/>2");
    }
}
