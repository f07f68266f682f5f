use std::io::Write;
use std::process::{Command, Stdio};

struct Outcome {
    ok: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
}

fn run_prog(src: &str, args: &[&str], stdin: &str) -> Outcome {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("prog.cpp");
    std::fs::write(&path, src).unwrap();
    let mut child = Command::new(env!("CARGO_BIN_EXE_tutorcc"))
        .args(args)
        .arg(&path)
        .env_remove("TUTORCC_LANG")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    let output = child.wait_with_output().expect("run");
    Outcome {
        ok: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

const HELLO: &str = "#include <iostream>\nusing namespace std;\n\nint main() {\n  cout << \"hi\" << endl;\n}\n";

#[test]
fn runs_a_program() {
    let out = run_prog(HELLO, &[], "");
    assert!(out.ok, "stderr: {}", out.stderr);
    assert_eq!(out.stdout, "hi\n");
}

#[test]
fn reads_standard_input() {
    let program = "int main() {\n  int a, b;\n  cin >> a >> b;\n  cout << a * b << endl;\n}\n";
    let out = run_prog(program, &[], "6 7\n");
    assert!(out.ok, "stderr: {}", out.stderr);
    assert_eq!(out.stdout, "42\n");
}

#[test]
fn execution_error_is_reported_with_position() {
    let program = "int main() {\n  cout << \"start\" << endl;\n  int a[2];\n  a[5] = 1;\n}\n";
    let out = run_prog(program, &[], "");
    assert!(!out.ok);
    assert_eq!(out.code, Some(1));
    assert_eq!(out.stdout, "start\n");
    assert!(
        out.stderr.contains("<Execution Error>: 4,5: Cell 5 does not exist."),
        "stderr: {}",
        out.stderr
    );
}

#[test]
fn compilation_error_is_reported() {
    let out = run_prog("int main( {\n", &[], "");
    assert!(!out.ok);
    assert!(out.stderr.contains("<Compilation Error>"), "stderr: {}", out.stderr);
    assert!(out.stdout.is_empty());
}

#[test]
fn messages_in_catalan() {
    let out = run_prog("int main() { x = 1; }", &["--lang", "ca"], "");
    assert!(!out.ok);
    assert!(
        out.stderr.contains("<Error d'execució>: 1,14: La variable 'x' no existeix."),
        "stderr: {}",
        out.stderr
    );
}

#[test]
fn step_mode_prints_every_step() {
    let out = run_prog(HELLO, &["--step"], "");
    assert!(out.ok, "stderr: {}", out.stderr);
    let lines: Vec<&str> = out.stdout.lines().collect();
    assert!(lines[0].starts_with("[1] 4:1-6:2  int main() {"), "{:?}", lines);
    assert_eq!(lines[1], "    The program begins.");
    assert!(lines[2].starts_with("[2] 5:11-5:15"), "{:?}", lines);
    assert_eq!(lines[3], "    Some output is written.");
    assert_eq!(lines[4], "    | hi");
    assert!(out.stdout.contains("    The program ends."));
}

#[test]
fn step_mode_can_show_the_environment() {
    let program = "int main() {\n  int n = 3;\n}\n";
    let out = run_prog(program, &["--step", "--env"], "");
    assert!(out.ok, "stderr: {}", out.stderr);
    assert!(
        out.stdout
            .contains(r#"[{"active":true,"bindings":[{"name":"n","type":"int","value":3}],"name":"main"}]"#),
        "stdout: {}",
        out.stdout
    );
}

#[test]
fn env_flag_requires_step() {
    let out = run_prog(HELLO, &["--env"], "");
    assert!(!out.ok);
    assert_eq!(out.code, Some(2));
}
