//! E2E Tests: Built-in Operators
//!
//! concat, join, keys, base64, empty/null, cartesian-product, ips,
//! static_ips, file/load through the full pipeline.

mod common;

use common::{evaluate, evaluate_err, evaluate_with, get, get_str};
use graft_engine::{EngineOptions, MergeOptions};
use graft_tree::Value;
use std::io::Write;

#[test]
fn e2e_concat_strings_and_references() {
    let tree = evaluate(&[
        "meta: { app: myapp, v: \"1.0\" }\nname: (( concat meta.app \"-\" meta.v ))\n",
    ]);
    assert_eq!(get_str(&tree, "name"), "myapp-1.0");
}

#[test]
fn e2e_concat_stringifies_numbers() {
    let tree = evaluate(&["port: 8080\nurl: (( concat \"host:\" port ))\n"]);
    assert_eq!(get_str(&tree, "url"), "host:8080");
}

#[test]
fn e2e_concat_rejects_collections() {
    let errors = evaluate_err(&["m: { a: 1 }\nout: (( concat \"x\" m ))\n"]);
    assert!(errors.to_string().contains("$.out"));
}

#[test]
fn e2e_join_list_with_separator() {
    let tree = evaluate(&["xs: [a, b, c]\nout: (( join \",\" xs ))\n"]);
    assert_eq!(get_str(&tree, "out"), "a,b,c");
}

#[test]
fn e2e_join_mixed_lists_and_scalars() {
    let tree = evaluate(&["xs: [1, 2]\nout: (( join \"-\" xs \"end\" ))\n"]);
    assert_eq!(get_str(&tree, "out"), "1-2-end");
}

#[test]
fn e2e_keys_sorted() {
    let tree = evaluate(&["m:\n  zebra: 1\n  apple: 2\nks: (( keys m ))\n"]);
    let ks = get(&tree, "ks");
    assert_eq!(
        ks.as_list().unwrap().as_slice(),
        &[Value::from("apple"), Value::from("zebra")]
    );
}

#[test]
fn e2e_base64_round_trip() {
    let tree = evaluate(&[
        "plain: hello world\nenc: (( base64 plain ))\ndec: (( base64-decode enc ))\n",
    ]);
    assert_eq!(get_str(&tree, "enc"), "aGVsbG8gd29ybGQ=");
    assert_eq!(get_str(&tree, "dec"), "hello world");
}

#[test]
fn e2e_empty_kinds() {
    let tree = evaluate(&["h: (( empty hash ))\na: (( empty array ))\ns: (( empty string ))\n"]);
    assert_eq!(get(&tree, "h"), Value::empty_map());
    assert_eq!(get(&tree, "a"), Value::empty_list());
    assert_eq!(get(&tree, "s"), Value::from(""));
}

#[test]
fn e2e_null_operator() {
    let tree = evaluate(&["n: (( null ))\n"]);
    assert_eq!(get(&tree, "n"), Value::Null);
}

#[test]
fn e2e_cartesian_product() {
    let tree = evaluate(&[
        "hosts: [a, b]\nports: [\"1\", \"2\"]\ncombos: (( cartesian-product hosts \":\" ports ))\n",
    ]);
    let combos = get(&tree, "combos");
    assert_eq!(
        combos.as_list().unwrap().as_slice(),
        &[
            Value::from("a:1"),
            Value::from("a:2"),
            Value::from("b:1"),
            Value::from("b:2"),
        ]
    );
}

#[test]
fn e2e_ips_from_cidr() {
    let tree = evaluate(&["ip: (( ips \"10.0.0.0/24\" 5 ))\n"]);
    assert_eq!(get_str(&tree, "ip"), "10.0.0.5");
}

#[test]
fn e2e_ips_negative_index_counts_from_top() {
    let tree = evaluate(&["ip: (( ips \"10.0.0.0/24\" -1 ))\n"]);
    assert_eq!(get_str(&tree, "ip"), "10.0.0.255");
}

#[test]
fn e2e_ips_with_count_returns_list() {
    let tree = evaluate(&["range: (( ips \"192.168.1.10\" 0 3 ))\n"]);
    let range = get(&tree, "range");
    assert_eq!(
        range.as_list().unwrap().as_slice(),
        &[
            Value::from("192.168.1.10"),
            Value::from("192.168.1.11"),
            Value::from("192.168.1.12"),
        ]
    );
}

#[test]
fn e2e_ips_out_of_range_fails() {
    let errors = evaluate_err(&["ip: (( ips \"10.0.0.0/30\" 9 ))\n"]);
    assert!(errors.to_string().contains("$.ip"));
}

const STATIC_POOL: &str = "networks:\n- name: net1\n  subnets:\n  - static:\n    - 10.0.0.5 - 10.0.0.10\n";

#[test]
fn e2e_static_ips_allocates_offsets() {
    let doc = format!(
        "{STATIC_POOL}jobs:\n- name: api\n  networks:\n  - name: net1\n    static_ips: (( static_ips 0 2 ))\n"
    );
    let tree = evaluate(&[&doc]);
    let ips = get(&tree, "jobs.api.networks.net1.static_ips");
    assert_eq!(
        ips.as_list().unwrap().as_slice(),
        &[Value::from("10.0.0.5"), Value::from("10.0.0.7")]
    );
}

#[test]
fn e2e_static_ips_refuses_duplicates_across_jobs() {
    let doc = format!(
        "{STATIC_POOL}jobs:\n- name: api\n  networks:\n  - name: net1\n    static_ips: (( static_ips 0 ))\n- name: db\n  networks:\n  - name: net1\n    static_ips: (( static_ips 0 ))\n"
    );
    let errors = evaluate_err(&[&doc]);
    assert!(errors.to_string().contains("already allocated"));
}

#[test]
fn e2e_static_ips_pool_exhaustion() {
    let doc = format!(
        "{STATIC_POOL}jobs:\n- name: api\n  networks:\n  - name: net1\n    static_ips: (( static_ips 40 ))\n"
    );
    let errors = evaluate_err(&[&doc]);
    assert!(errors.to_string().contains("exceeds the pool"));
}

#[test]
fn e2e_file_reads_contents() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    write!(tmp, "file payload").unwrap();
    let doc = format!("data: (( file \"{}\" ))\n", tmp.path().display());
    let tree = evaluate(&[&doc]);
    assert_eq!(get_str(&tree, "data"), "file payload");
}

#[test]
fn e2e_file_missing_is_reported() {
    let errors = evaluate_err(&["data: (( file \"/no/such/file.txt\" ))\n"]);
    assert!(errors.to_string().contains("$.data"));
}

#[test]
fn e2e_load_parses_yaml() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    write!(tmp, "inner:\n  value: 9\n").unwrap();
    let doc = format!("loaded: (( load \"{}\" ))\n", tmp.path().display());
    let tree = evaluate(&[&doc]);
    assert_eq!(get(&tree, "loaded.inner.value"), Value::Int(9));
}

#[test]
fn e2e_load_parses_json() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    write!(tmp, "{{\"a\": [1, 2]}}").unwrap();
    let doc = format!("loaded: (( load \"{}\" ))\n", tmp.path().display());
    let tree = evaluate(&[&doc]);
    assert_eq!(get(&tree, "loaded.a").as_list().unwrap().len(), 2);
}

#[test]
fn e2e_arity_violation_fails_before_run() {
    let errors = evaluate_err(&["x: (( keys ))\n"]);
    assert!(errors.to_string().contains("at least 1 argument"));
}

#[test]
fn e2e_sort_misused_as_value_gives_pointed_error() {
    let errors = evaluate_err(&["xs: (( sort by name ))\n"]);
    assert!(errors.to_string().contains("must override an existing list"));
}

#[test]
fn e2e_custom_operator() {
    use graft_engine::{OpContext, Operator, Phase, Response};
    use graft_lang::Expr;

    struct Shout;
    impl Operator for Shout {
        fn phase(&self) -> Phase {
            Phase::Eval
        }
        fn arity(&self) -> (usize, i64) {
            (1, 1)
        }
        fn run(&self, ctx: &OpContext<'_>, args: &[Expr]) -> graft_base::Result<Response> {
            let text = ctx.resolve_string(&args[0])?;
            Ok(Response::replace(Value::String(text.to_uppercase())))
        }
    }

    let options = EngineOptions::new().with_operator("shout", std::sync::Arc::new(Shout));
    let tree = evaluate_with(
        &["quiet: hello\nloud: (( shout quiet ))\n"],
        &MergeOptions::new(),
        options,
    );
    assert_eq!(get_str(&tree, "loud"), "HELLO");
}
