//! Binary tests: run `atpl` as a subprocess and check what it writes.
//!
//! Every invocation passes `-f` (or an explicit vars file) so a stray
//! `~/.atplrc` on the test machine cannot leak into the results.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use pretty_assertions::assert_eq;

// ── Helpers ───────────────────────────────────────────────────────────────────

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_atpl"))
}

/// Run the binary with `args`, feeding `stdin` and collecting all output.
fn run(args: &[&str], stdin: &str, cwd: &Path) -> Output {
    let mut child = Command::new(binary())
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn atpl binary");
    {
        let pipe = child.stdin.as_mut().expect("stdin not open");
        pipe.write_all(stdin.as_bytes()).expect("write to stdin");
    }
    child.wait_with_output().expect("wait for atpl")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[test]
fn renders_stdin_to_stdout() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["-f"], "@[SET:x=6]@[=x*7]\n", dir.path());
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "42\n");
}

#[test]
fn dash_reads_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["-f", "-"], "a@[=1+1]b", dir.path());
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "a2b");
}

#[test]
fn renders_template_file() {
    let dir = tempfile::tempdir().unwrap();
    let tpl = write_file(dir.path(), "page.tpl", "@[FOREACH:i IN range(0, 3)]<@[=i]>@[ENDFOREACH]");
    let out = run(&["-f", tpl.to_str().unwrap()], "", dir.path());
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "<0><1><2>");
}

#[test]
fn defines_are_evaluated_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(
        &["-f", "-Dbase=10", "-D", "twice=base*2", "-Dname=\"web\""],
        "@[=name]:@[=twice]",
        dir.path(),
    );
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "web:20");
}

#[test]
fn explicit_vars_file() {
    let dir = tempfile::tempdir().unwrap();
    let vars = write_file(
        dir.path(),
        "site.vars",
        "; site settings\n/set site=\"example\"\n/set year=2000+24\n",
    );
    let tpl = write_file(dir.path(), "page.tpl", "@[=site] @[=year]");
    let out = run(
        &["-f", vars.to_str().unwrap(), tpl.to_str().unwrap()],
        "",
        dir.path(),
    );
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "example 2024");
}

#[test]
fn defines_override_vars_file() {
    let dir = tempfile::tempdir().unwrap();
    let vars = write_file(dir.path(), "site.vars", "/set title=\"from file\"\n");
    let flag = format!("-f{}", vars.display());
    let out = run(&[&flag, "-Dtitle=\"from flag\""], "@[=title]", dir.path());
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "from flag");
}

#[test]
fn bad_vars_line_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let vars = write_file(dir.path(), "bad.vars", "/set a=1/0\n/set b=2\n");
    let flag = format!("-f{}", vars.display());
    let out = run(&[&flag], "@[=b]", dir.path());
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "2");
    assert!(stderr(&out).contains("warning"), "stderr: {}", stderr(&out));
}

#[test]
fn local_atplrc_is_found() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), ".atplrc", "/set greeting=\"hello\"\n");
    let mut child = Command::new(binary())
        .current_dir(dir.path())
        .env("HOME", dir.path().join("no-such-home"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn atpl binary");
    child
        .stdin
        .as_mut()
        .expect("stdin not open")
        .write_all(b"@[=greeting]")
        .expect("write to stdin");
    let out = child.wait_with_output().expect("wait for atpl");
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "hello");
}

#[test]
fn writes_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("out.txt");
    let out = run(&["-f", "-o", target.to_str().unwrap()], "@[=\"done\"]", dir.path());
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "");
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "done");
}

#[test]
fn render_error_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["-f"], "before @[=1/0] after", dir.path());
    assert_eq!(out.status.code(), Some(1));
    assert_eq!(stdout(&out), "");
    assert!(stderr(&out).starts_with("atpl: "), "stderr: {}", stderr(&out));
    assert!(stderr(&out).contains("division by zero"));
}

#[test]
fn unclosed_block_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["-f"], "@[IF:true]never closed", dir.path());
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("never closed"), "stderr: {}", stderr(&out));
}

#[test]
fn usage_error_prints_usage() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["-z"], "", dir.path());
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.starts_with("atpl: unknown option: -z"), "stderr: {err}");
    assert!(err.contains("Usage: atpl"));
}

#[test]
fn missing_template_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = run(&["-f", "nope.tpl"], "", dir.path());
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("cannot read nope.tpl"), "stderr: {}", stderr(&out));
}
