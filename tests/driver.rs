//! Runs the `caplanc` binary on files in a scratch directory.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

/// A fresh directory under the system temp dir, unique to this test.
fn scratch(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("caplanc-{}-{name}", std::process::id()));
  let _ = fs::remove_dir_all(&dir);
  fs::create_dir_all(&dir).unwrap();
  dir
}

fn caplanc(args: &[&std::ffi::OsStr]) -> Output {
  Command::new(env!("CARGO_BIN_EXE_caplanc"))
    .args(args)
    .output()
    .expect("run caplanc")
}

#[test]
fn writes_asm_next_to_the_input() {
  let dir = scratch("default");
  let input = dir.join("prog.cap");
  fs::write(&input, "proc int main() return 0\n").unwrap();

  let output = caplanc(&[input.as_os_str()]);
  assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
  let asm = fs::read_to_string(dir.join("prog.asm")).unwrap();
  assert!(asm.starts_with("global main\n"));
}

#[test]
fn writes_to_the_requested_output() {
  let dir = scratch("explicit");
  let input = dir.join("prog.cap");
  let target = dir.join("out.s");
  fs::write(&input, "proc int main() return 0\n").unwrap();

  let output = caplanc(&[input.as_os_str(), "-o".as_ref(), target.as_os_str()]);
  assert!(output.status.success());
  assert!(target.exists());
  assert!(!dir.join("prog.asm").exists());
}

#[test]
fn errors_exit_with_status_one() {
  let dir = scratch("error");
  let input = dir.join("bad.cap");
  fs::write(&input, "proc int main() return (+ 1 y)\n").unwrap();

  let output = caplanc(&[input.as_os_str()]);
  assert_eq!(output.status.code(), Some(1));
  let stderr = String::from_utf8_lossy(&output.stderr);
  assert!(stderr.starts_with("ERROR: Use of undeclared variable y @28 (1,28):"), "{stderr}");
  assert!(stderr.contains("proc int main() return (+ 1 y)"));
  assert!(!dir.join("bad.asm").exists());
}

#[test]
fn missing_input_exits_with_status_one() {
  let dir = scratch("missing");
  let output = caplanc(&[dir.join("absent.cap").as_os_str()]);
  assert_eq!(output.status.code(), Some(1));
  assert!(String::from_utf8_lossy(&output.stderr).starts_with("cannot read "));
}
