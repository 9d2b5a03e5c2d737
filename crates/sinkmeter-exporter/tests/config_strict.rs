#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use sinkmeter_exporter::config;

const MANIFEST: &str = r#"
manifest:
  manifest: "substreams.spkg"
  substreams_endpoint: "eth.example:443"
  module_hash: "0xabc"
  output_module: "map_events"
"#;

#[test]
fn deny_unknown_fields_nested() {
    let bad = format!(
        r#"
version: 1
exporter:
  listen: "0.0.0.0:9102"
  channel_capacty: 10 # typo should fail
{MANIFEST}"#
    );

    let err = config::load_from_str(&bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_REQUEST");
}

#[test]
fn ok_minimal_config() {
    let ok = format!("version: 1\n{MANIFEST}");
    let cfg = config::load_from_str(&ok).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.exporter.listen, "0.0.0.0:9102");
    assert_eq!(cfg.exporter.channel_capacity, 1024);
    assert_eq!(cfg.metrics.trace_id_series_limit, None);

    let m = cfg.manifest.descriptor();
    assert_eq!(m.request.output_module, "map_events");
    assert_eq!(m.request.start_block_num, 0);
    assert!(!m.request.production_mode);
}

#[test]
fn rejects_wrong_version() {
    let bad = format!("version: 2\n{MANIFEST}");
    let err = config::load_from_str(&bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn rejects_out_of_range_values() {
    for section in [
        "exporter:\n  listen: \"not-an-addr\"\n",
        "exporter:\n  channel_capacity: 0\n",
        "metrics:\n  trace_id_series_limit: 0\n",
    ] {
        let bad = format!("version: 1\n{section}{MANIFEST}");
        let err = config::load_from_str(&bad).expect_err(section);
        assert_eq!(err.code().as_str(), "BAD_REQUEST", "section={section}");
    }
}

#[test]
fn rejects_inverted_block_range() {
    let bad = format!("version: 1\n{MANIFEST}  start_block_num: 200\n  stop_block_num: 100\n");
    let err = config::load_from_str(&bad).expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_REQUEST");
}

#[test]
fn manifest_is_required() {
    let err = config::load_from_str("version: 1\n").expect_err("must fail");
    assert_eq!(err.code().as_str(), "BAD_REQUEST");
}
