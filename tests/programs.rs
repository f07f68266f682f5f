use tutorcc::error::{ErrorKind, EvalError};
use tutorcc::translate::{Lang, Translator};

fn run_with_input(src: &str, input: &str) -> String {
    let program = tutorcc::parse_source(src).expect("parse");
    let (out, result) = tutorcc::run(&program, input, Translator::default());
    if let Err(e) = result {
        panic!("run failed: {}\noutput so far: {:?}", e, out);
    }
    out
}

fn run(src: &str) -> String {
    run_with_input(src, "")
}

fn run_err(src: &str) -> (String, EvalError) {
    let program = tutorcc::parse_source(src).expect("parse");
    let (out, result) = tutorcc::run(&program, "", Translator::default());
    match result {
        Ok(()) => panic!("expected an error, got output {:?}", out),
        Err(e) => (out, e),
    }
}

fn err_kind(src: &str) -> ErrorKind {
    run_err(src).1.kind
}

#[test]
fn hello_world() {
    let program = r#"
#include <iostream>
using namespace std;

int main() {
    cout << "Hello, world!" << endl;
    return 0;
}
"#;
    assert_eq!(run(program), "Hello, world!\n");
}

#[test]
fn arithmetic_and_number_formatting() {
    let program = r#"
int main() {
    int a = 7;
    int b = 2;
    double d = 7.0;
    cout << a / b << " " << a % b << " " << d / b << endl;
    cout << 1.0 / 3 << " " << 2.5f * 2 << endl;
    bool t = a > b;
    cout << t << " " << (a == b) << endl;
}
"#;
    assert_eq!(run(program), "3 1 3.5\n0.333333 5\n1 0\n");
}

#[test]
fn recursion_and_reference_parameters() {
    let program = r#"
int fact(int n) {
    if (n <= 1) return 1;
    return n * fact(n - 1);
}

void swap(int& a, int& b) {
    int t = a;
    a = b;
    b = t;
}

int main() {
    int x = 3;
    int y = 4;
    swap(x, y);
    cout << fact(5) << " " << x << " " << y << endl;
}
"#;
    assert_eq!(run(program), "120 4 3\n");
}

#[test]
fn vectors_arrays_and_for_loops() {
    let program = r#"
int main() {
    vector<int> v;
    for (int i = 0; i < 5; i++) {
        v.push_back(i * i);
    }
    int sum = 0;
    for (int i = 0; i < v.size(); i++) {
        sum += v[i];
    }
    int a[3] = {1, 2};
    a[2] = 10;
    cout << v.size() << " " << sum << " " << a[0] + a[1] + a[2] << endl;
    cout << v.back() << " " << v.front() << endl;
}
"#;
    assert_eq!(run(program), "5 30 13\n16 0\n");
}

#[test]
fn structs_copy_by_value() {
    let program = r#"
struct Point {
    int x;
    int y;
};

int norm1(Point p) {
    return p.x + p.y;
}

int main() {
    Point p = {3, 4};
    Point q;
    q.x = 1;
    q = p;
    p.y = 10;
    cout << norm1(p) << " " << q.y << endl;
}
"#;
    assert_eq!(run(program), "13 4\n");
}

#[test]
fn strings_and_input() {
    let program = r#"
int main() {
    string name;
    int n;
    cin >> name >> n;
    string s = "Hi " + name;
    cout << s << "!" << n * 2 << endl;
    cout << s.size() << endl;
}
"#;
    assert_eq!(run_with_input(program, "Ada 21\n"), "Hi Ada!42\n6\n");
}

#[test]
fn missing_input_leaves_variable_unchanged() {
    let program = r#"
int main() {
    int n = 5;
    cin >> n;
    cout << n << endl;
}
"#;
    assert_eq!(run_with_input(program, ""), "5\n");
    assert_eq!(run_with_input(program, "oops"), "5\n");
}

#[test]
fn chars_are_read_one_at_a_time() {
    let program = r#"
int main() {
    char a, b;
    cin >> a >> b;
    cout << a << b << endl;
}
"#;
    assert_eq!(run_with_input(program, "xy\n"), "xy\n");
}

#[test]
fn numbers_stop_at_the_first_foreign_character() {
    let program = r#"
int main() {
    int n = 0, m = 0;
    cin >> n >> m;
    cout << n << " " << m << endl;
    char sep;
    cin >> sep >> m;
    cout << sep << m << endl;
}
"#;
    assert_eq!(run_with_input(program, "12,34"), "12 0\n,34\n");
}

#[test]
fn globals_constants_and_conditional_expression() {
    let program = r#"
int counter = 10;
const int LIMIT = 3;

void bump() {
    counter = counter + 1;
}

int main() {
    for (int i = 0; i < LIMIT; i++) bump();
    cout << counter << " " << (counter > 12 ? "big" : "small") << endl;
}
"#;
    assert_eq!(run(program), "13 big\n");
}

#[test]
fn integer_overflow_wraps() {
    let program = r#"
int main() {
    int big = 2147483647;
    big = big + 1;
    cout << big << endl;
}
"#;
    assert_eq!(run(program), "-2147483648\n");
}

#[test]
fn inner_blocks_shadow_outer_variables() {
    let program = r#"
int main() {
    int x = 1;
    {
        int x = 2;
        cout << x;
    }
    cout << x << endl;
}
"#;
    assert_eq!(run(program), "21\n");
}

#[test]
fn while_with_if_else() {
    let program = r#"
int main() {
    int n = 10;
    int steps = 0;
    while (n != 1) {
        if (n % 2 == 0) {
            n = n / 2;
        } else {
            n = 3 * n + 1;
        }
        steps++;
    }
    cout << steps << endl;
}
"#;
    assert_eq!(run(program), "6\n");
}

#[test]
fn return_leaves_loops_early() {
    let program = r#"
int find(vector<int> v, int x) {
    for (int i = 0; i < v.size(); i++) {
        if (v[i] == x) {
            return i;
        }
    }
    return -1;
}

int main() {
    vector<int> v = {4, 8, 15, 16};
    cout << find(v, 15) << " " << find(v, 3) << endl;
}
"#;
    assert_eq!(run(program), "2 -1\n");
}

#[test]
fn return_value_is_converted_to_declared_type() {
    let program = r#"
int half(double x) {
    return x / 2;
}

int main() {
    cout << half(7.0) << endl;
}
"#;
    assert_eq!(run(program), "3\n");
}

#[test]
fn reference_declarations_alias() {
    let program = r#"
int main() {
    int a = 1;
    int& r = a;
    r = 5;
    r += 1;
    cout << a << endl;
}
"#;
    assert_eq!(run(program), "6\n");
}

#[test]
fn chained_assignment_uses_converted_value() {
    let program = r#"
int main() {
    int a;
    double b;
    b = a = 3.7;
    cout << a << " " << b << endl;
}
"#;
    assert_eq!(run(program), "3 3\n");
}

#[test]
fn conditional_expression_evaluates_one_branch() {
    let program = r#"
int main() {
    int zero = 0;
    int x = true ? 1 : 10 / zero;
    cout << x << endl;
}
"#;
    assert_eq!(run(program), "1\n");
}

#[test]
fn logical_operators_evaluate_both_sides() {
    let src = "int main() { int n = 0; bool ok = n > 0 && 10 / n > 1; }";
    assert_eq!(err_kind(src), ErrorKind::ArithmeticFault);

    let program = r#"
int calls = 0;
bool touch() {
    calls++;
    return true;
}
int main() {
    bool b = true || touch();
    cout << calls << endl;
}
"#;
    assert_eq!(run(program), "1\n");
}

#[test]
fn reading_into_a_constant_fails() {
    let program = tutorcc::parse_source("int main() { const int k = 1; cin >> k; }").unwrap();
    let (_, result) = tutorcc::run(&program, "5", Translator::default());
    assert_eq!(result.unwrap_err().kind, ErrorKind::NotAnLvalue);
}

#[test]
fn runs_are_deterministic() {
    let program = r#"
int main() {
    vector<double> v(1.5, 2.5);
    double total = 0;
    for (int i = 0; i < v.size(); i++) total += v[i];
    cout << total << endl;
}
"#;
    let first = run(program);
    assert_eq!(first, "4\n");
    assert_eq!(run(program), first);

    let failing = r#"
int pick(bool c) {
    if (c) return 1;
}
int main() {
    cout << "x" << pick(true);
    cout << pick(false);
}
"#;
    let (out, err) = run_err(failing);
    assert_eq!(out, "x1");
    assert_eq!(err.kind, ErrorKind::MissingReturn);
    assert_eq!(run_err(failing), (out, err));
}

#[test]
fn output_before_an_error_is_kept() {
    let (out, err) = run_err("int main() { cout << \"a\"; int x = 1 / 0; }");
    assert_eq!(out, "a");
    assert_eq!(err.kind, ErrorKind::ArithmeticFault);
}

#[test]
fn error_carries_innermost_position() {
    let (_, err) = run_err("int main() { x = 1; }");
    assert_eq!(err.kind, ErrorKind::Name);
    assert_eq!(err.to_string(), "1,14: The variable 'x' does not exist.");

    let (_, err) = run_err("int main() {\n  int a[2];\n  a[5] = 1;\n}\n");
    assert_eq!(err.kind, ErrorKind::IndexOutOfRange);
    let pos = err.pos.expect("position");
    assert_eq!((pos.line, pos.col), (3, 5));
}

#[test]
fn messages_follow_the_translator() {
    let program = tutorcc::parse_source("int main() { x = 1; }").unwrap();
    let (_, result) = tutorcc::run(&program, "", Translator::new(Lang::Es));
    let err = result.unwrap_err();
    assert_eq!(err.message, "La variable 'x' no existe.");
}

#[test]
fn every_error_kind_is_reported() {
    let cases: &[(&str, ErrorKind)] = &[
        ("int main() { vector<widget> v; }", ErrorKind::TypeUnknown),
        ("int main() { int x = 1; if (x) { } }", ErrorKind::ConditionType),
        ("int main() { int x = 1; while (x) { } }", ErrorKind::ConditionType),
        ("int main() { bool b = true; int x = 1 + b; }", ErrorKind::IncompatibleOperands),
        ("int main() { int x = 1; double y = 1.0; bool b = x == y; }", ErrorKind::IncompatibleOperands),
        ("int main() { bool b = true && 1; }", ErrorKind::IncompatibleOperands),
        ("int main() { 3 = 4; }", ErrorKind::NotAnLvalue),
        ("int main() { const int k = 1; k = 2; }", ErrorKind::NotAnLvalue),
        ("int main() { const int k = 1; k++; }", ErrorKind::NotAnLvalue),
        ("void f(int& a) { } int main() { f(3); }", ErrorKind::ReferenceRequired),
        ("int f(int a) { return a; } int main() { f(1, 2); }", ErrorKind::Arity),
        ("int f(int a) { return a; } int main() { f(2.5); }", ErrorKind::ArgumentTypeMismatch),
        ("int f() { } int main() { f(); }", ErrorKind::MissingReturn),
        ("int f(bool c) { if (c) return 1; } int main() { f(false); }", ErrorKind::MissingReturn),
        ("int main() { int x = 1; x(); }", ErrorKind::NotCallable),
        ("int main() { int a[2]; a[2] = 1; }", ErrorKind::IndexOutOfRange),
        ("int main() { int a[2]; a[-1] = 1; }", ErrorKind::IndexOutOfRange),
        ("int main() { vector<int> v; v.back(); }", ErrorKind::IndexOutOfRange),
        ("struct P { int x; }; int main() { P p; p.z = 1; }", ErrorKind::NoSuchField),
        ("int main() { int x = \"hi\"; }", ErrorKind::ConversionFailure),
        ("int main() { int a[2] = {1, 2, 3}; }", ErrorKind::ConversionFailure),
        ("int main() { int a[0]; }", ErrorKind::ArraySize),
        ("int main() { int z = 0; int x = 5 % z; }", ErrorKind::ArithmeticFault),
        ("int f() { return 1; }", ErrorKind::NoMain),
        ("struct P { int x; }; int main() { P p(1); }", ErrorKind::Unsupported),
        ("int main() { int x = 1; x = {2}; }", ErrorKind::Unsupported),
    ];
    for (src, kind) in cases {
        assert_eq!(err_kind(src), *kind, "program: {}", src);
    }
}
