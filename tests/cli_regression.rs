// Regression tests for the `smlang` binary.
// Requires: assert_cmd, predicates crates in [dev-dependencies]

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;

fn smlang() -> Command {
    Command::cargo_bin("smlang").unwrap()
}

#[test]
fn cli_check_reports_each_file() {
    smlang()
        .args(["check", "tests/fixtures/malloc_checker.sm"])
        .assert()
        .success()
        .stdout(contains("ok: tests/fixtures/malloc_checker.sm (2 sm)"));
}

#[test]
fn cli_check_notes_unresolved_patterns() {
    smlang()
        .args(["check", "tests/fixtures/unresolved.sm"])
        .assert()
        .success()
        .stdout(contains("note: tests/fixtures/unresolved.sm: sm uses_missing uses undefined pattern 'not_defined'"));
}

#[test]
fn cli_check_stops_at_first_error() {
    smlang()
        .args(["check", "tests/fixtures"])
        .assert()
        .failure()
        .code(1)
        .stdout(contains("malloc_checker.sm").not())
        .stderr(contains("bad_fragment.sm:8:14: error in code fragment"));
}

#[test]
fn cli_plain_syntax_error() {
    smlang()
        .args(["check", "tests/fixtures/missing_name.sm"])
        .assert()
        .failure()
        .stderr(contains(
            "missing_name.sm:2:20: Parse error, expected identifier at \";\":\n  decl any_pointer ;\n",
        ));
}

#[test]
fn cli_reports_miette_diagnostics_on_error() {
    smlang()
        .args(["--diagnostics", "fancy", "check", "tests/fixtures/missing_name.sm"])
        .assert()
        .failure()
        .stderr(contains("sm::syntax"));
}

#[test]
fn cli_missing_file_is_reported() {
    smlang()
        .args(["check", "tests/fixtures/nope.sm"])
        .assert()
        .failure()
        .stderr(contains("could not read tests/fixtures/nope.sm"));
}

#[test]
fn cli_tokens_dump() {
    smlang()
        .args(["tokens", "tests/fixtures/missing_name.sm"])
        .assert()
        .success()
        .stdout(contains("1:0 keyword sm\n1:3 ident X\n1:5 punct {\n2:9 keyword decl\n"));
}

#[test]
fn cli_tokens_stops_at_illegal_character() {
    smlang()
        .args(["tokens", "tests/fixtures/illegal_char.sm"])
        .assert()
        .failure()
        .stdout(contains("2:7 ident b\n2:8 punct .\n3:10 ident c\n"))
        .stderr(contains("illegal_char.sm:3:2: Illegal character '?'"));
}

#[test]
fn cli_builtins_listing() {
    smlang()
        .args(["builtins"])
        .assert()
        .success()
        .stdout(contains("error/1  Report an error diagnostic").and(contains(
            "set_state/1  Move the tracked variable into the named state.",
        )));
}

#[test]
fn cli_ast_json() {
    smlang()
        .args(["ast", "--json", "tests/fixtures/malloc_checker.sm"])
        .assert()
        .success()
        .stdout(contains("\"name\": \"malloc_checker\"").and(contains("\"any_pointer\"")));
}

#[test]
fn cli_ast_debug_tree() {
    smlang()
        .args(["ast", "tests/fixtures/malloc_checker.sm"])
        .assert()
        .success()
        .stdout(contains("Checker {").and(contains("VarDereference")));
}
