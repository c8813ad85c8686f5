/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs;

use serde_json::json;
use taint::interchange::{self, ParseError};
use taint::marking::{mark_taint_operation, mark_taint_source, report_taint_sink};
use taint::prefs::TaintingPrefs;
use taint::{
    StringTaint, TaintFlow, TaintLocation, TaintOperation, TaintableString, TaintedString, dot,
    report,
};

fn bounds(string: &TaintedString) -> Vec<(u32, u32)> {
    string
        .taint()
        .iter()
        .map(|range| (range.begin(), range.end()))
        .collect()
}

fn history(string: &TaintedString, index: u32) -> Vec<String> {
    string
        .taint()
        .at(index)
        .map(|flow| {
            flow.iter()
                .map(|node| node.operation().name().to_owned())
                .collect()
        })
        .unwrap_or_default()
}

fn source(name: &'static str) -> TaintOperation {
    TaintOperation::new(name).source()
}

#[test]
fn concat_and_substring_track_characters() {
    let hash = TaintedString::tainted("#abc", source("location.hash"));
    let string = TaintedString::new("x=").concat(&hash).concat(&"!".into());
    assert_eq!(string.as_str(), "x=#abc!");
    assert_eq!(bounds(&string), [(2, 6)]);

    let sub = string.substring(3, 7);
    assert_eq!(sub.as_str(), "abc!");
    assert_eq!(bounds(&sub), [(0, 3)]);
    assert_eq!(history(&sub, 0), ["substring", "location.hash"]);
    assert!(sub.taint().at(0).unwrap().head().unwrap().operation().is_native());
}

#[test]
fn replace_range_moves_following_taint() {
    let mut string = TaintedString::tainted("hello world", source("name"));
    string.replace_range(0, 5, &"hi".into());
    assert_eq!(string.as_str(), "hi world");
    assert_eq!(bounds(&string), [(2, 8)]);

    let replacement = TaintedString::tainted("WORLD", source("referrer"));
    string.replace_range(3, 8, &replacement);
    assert_eq!(string.as_str(), "hi WORLD");
    assert_eq!(bounds(&string), [(2, 3), (3, 8)]);
    assert_eq!(history(&string, 3), ["referrer"]);
}

#[test]
fn push_and_truncate() {
    let mut string = TaintedString::new("ab");
    string.push_tainted(&TaintedString::tainted("cd", source("s")));
    string.push_str("ef");
    assert_eq!(bounds(&string), [(2, 4)]);

    string.truncate(3);
    assert_eq!(string.as_str(), "abc");
    assert_eq!(bounds(&string), [(2, 3)]);
}

#[test]
fn case_mapping_extends_flows() {
    let string = TaintedString::tainted("MiXeD", source("s"));
    let upper = string.to_uppercase();
    assert_eq!(upper.as_str(), "MIXED");
    assert_eq!(history(&upper, 0), ["toUpperCase", "s"]);
    assert_eq!(history(&string.to_lowercase(), 4), ["toLowerCase", "s"]);
}

#[test]
fn base64_keeps_taint_on_the_encoded_data() {
    let mut string = TaintedString::new("plain ");
    string.push_tainted(&TaintedString::tainted("secret", source("cookie")));

    let encoded = string.to_base64();
    assert_eq!(encoded.as_str(), "cGxhaW4gc2VjcmV0");
    assert_eq!(bounds(&encoded), [(8, 16)]);
    assert_eq!(history(&encoded, 8), ["btoa", "cookie"]);

    let decoded = encoded.from_base64().unwrap();
    assert_eq!(decoded.as_str(), "plain secret");
    assert_eq!(bounds(&decoded), [(6, 12)]);
    assert_eq!(history(&decoded, 6), ["atob", "btoa", "cookie"]);

    assert!(TaintedString::new("not base64!").from_base64().is_err());
}

#[test]
fn json_quoting_taints_escapes() {
    let string = TaintedString::tainted("a\nb", source("s"));
    let quoted = string.quote_json();
    assert_eq!(quoted.as_str(), "\"a\\nb\"");
    assert_eq!(bounds(&quoted), [(1, 5)]);
}

#[test]
fn json_quoting_keeps_taint_inside_multibyte_characters() {
    // Only the second byte of "é" is tainted.
    let string = TaintedString::with_taint("aé", StringTaint::from_operation(2, 3, source("s")));
    let quoted = string.quote_json();
    assert_eq!(quoted.as_str(), "\"aé\"");
    assert_eq!(bounds(&quoted), [(3, 4)]);
    assert_eq!(history(&quoted, 3), ["s"]);

    let escaped = TaintedString::with_taint("é\t", StringTaint::from_operation(1, 3, source("s")));
    let quoted = escaped.quote_json();
    assert_eq!(quoted.as_str(), "\"é\\t\"");
    assert_eq!(bounds(&quoted), [(2, 5)]);
}

#[test]
fn sources_respect_preferences() {
    let mut prefs = TaintingPrefs::default();
    prefs.set_source_enabled("location.hash", false);

    let mut string = TaintedString::new("value");
    mark_taint_source(&prefs, &mut string, TaintOperation::new("location.hash"));
    assert!(!string.is_tainted());

    mark_taint_source(&prefs, &mut string, TaintOperation::new("document.cookie"));
    assert_eq!(bounds(&string), [(0, 5)]);
    let root = string.taint().at(0).unwrap().source().unwrap();
    assert!(root.is_source() && root.is_native());

    mark_taint_operation(&mut string, TaintOperation::new("decodeURI"));
    assert_eq!(history(&string, 0), ["decodeURI", "document.cookie"]);

    let mut untainted = TaintedString::new("x");
    mark_taint_operation(&mut untainted, TaintOperation::new("decodeURI"));
    assert!(!untainted.is_tainted());
}

#[test]
fn sinks_report_tainted_data() {
    let prefs = TaintingPrefs::from_json(r#"{"tainting.sink.innerHTML": false}"#).unwrap();
    let string = TaintedString::tainted(
        "<img>",
        source("location.hash").with_location(TaintLocation::new("app.js", 4, 2, "render")),
    );

    assert_eq!(report_taint_sink(&prefs, &string, "innerHTML", None), None);
    assert_eq!(
        report_taint_sink(&prefs, &TaintedString::new("safe"), "eval", None),
        None
    );

    let report = report_taint_sink(&prefs, &string, "eval", Some("code")).unwrap();
    assert_eq!(report.sink, "eval");
    assert_eq!(report.argument.as_deref(), Some("code"));
    assert_eq!(report.ranges.len(), 1);

    let value = serde_json::to_value(&report).unwrap();
    assert_eq!(value["ranges"][0]["begin"], json!(0));
    assert_eq!(value["ranges"][0]["end"], json!(5));
    assert_eq!(value["ranges"][0]["flow"][0]["name"], json!("location.hash"));
    assert_eq!(value["ranges"][0]["flow"][0]["location"]["line"], json!(4));
}

#[test]
fn report_lists_flows_newest_first() {
    let mut taint = StringTaint::from_operation(0, 3, source("s"));
    taint.extend("op".into());
    let ranges = report::describe(&taint);
    let names: Vec<&str> = ranges[0].flow.iter().map(TaintOperation::name).collect();
    assert_eq!(names, ["op", "s"]);
}

#[test]
fn interchange_round_trip() {
    let mut taint = StringTaint::from_operation(0, 5, source("src1"));
    taint.concat(&StringTaint::from_operation(0, 2, source("src2")), 8);
    taint.extend("intermediate".into());

    let text = interchange::serialize(&taint);
    assert_eq!(
        text,
        "[{begin: 0, end: 5, source: 'src1'}, {begin: 8, end: 10, source: 'src2'}]"
    );

    let parsed = interchange::parse(&text).unwrap();
    let triples: Vec<(u32, u32, Vec<&str>)> = parsed
        .iter()
        .map(|range| {
            let flow = range.flow().iter().map(|node| node.operation().name());
            (range.begin(), range.end(), flow.collect())
        })
        .collect();
    // Only sources survive.
    assert_eq!(triples, [(0, 5, vec!["src1"]), (8, 10, vec!["src2"])]);
}

#[test]
fn interchange_rejects_disordered_ranges() {
    assert_eq!(
        interchange::parse("[{begin: 10, end: 5, source:'x'}]"),
        Err(ParseError::EmptyRange)
    );
    assert_eq!(
        interchange::parse("[{begin:10,end:20,source:'a'},{begin:0,end:5,source:'b'}]"),
        Err(ParseError::OutOfOrder)
    );
    assert!(!interchange::parse_or_empty("[{begin:10,end:20,source:'a'},{begin:0,end:5,source:'b'}]").has_taint());
    assert!(interchange::parse_or_empty("[{begin: 1, end: 2, source: 'a'}]").has_taint());
}

#[test]
fn dot_graph_writes_shared_nodes_once() {
    let root = TaintFlow::new(TaintOperation::with_arguments("source", ["a|b"]).source());
    let mut taint = StringTaint::from_flow(root.extended("left".into()), 2);
    taint.concat(&StringTaint::from_flow(root.extended("right".into()), 2), 4);

    let mut output = Vec::new();
    dot::write_dot(&taint, &mut output).unwrap();
    let output = String::from_utf8(output).unwrap();

    assert!(output.starts_with("digraph taint {"));
    assert_eq!(output.matches("[label=<source<br/>a|b>]").count(), 1);
    assert_eq!(output.matches("[label=<left>]").count(), 1);
    assert_eq!(output.matches("[label=<right>]").count(), 1);
    // Two range edges and two edges into the shared source.
    assert_eq!(output.matches(" -> ").count(), 4);
}

#[test]
fn dot_dump_writes_a_file_per_string() {
    let directory = std::env::temp_dir().join(format!("taint-dot-{}", std::process::id()));
    let taint = StringTaint::from_operation(0, 1, source("s"));

    let path = dot::dump(&taint, &directory).unwrap();
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("dot"));
    assert!(fs::read_to_string(&path).unwrap().contains("label=<s>"));
    fs::remove_dir_all(&directory).unwrap();

    assert_eq!(dot::dump(&StringTaint::new(), &directory), None);
}
