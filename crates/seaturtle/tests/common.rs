use std::path::Path;

use seaturtle::{Event, Recorder};

#[derive(Default, Clone)]
pub struct TestCase {
    input: String,
    expected: String,
}

fn exec_one(s: &str) -> Result<Vec<Event>, seaturtle::Error> {
    let mut recorder = Recorder::default();
    seaturtle::run(s, &mut recorder)?;
    Ok(recorder.events().cloned().collect())
}

fn parse_loc(s: &str) -> (usize, u32, &str) {
    let mut split = s.trim().splitn(3, ' ');
    let offset = split.next().unwrap().parse().unwrap();
    let line = split.next().unwrap().parse().unwrap();
    let rest = split.next().unwrap();
    (offset, line, rest)
}

impl TestCase {
    fn exec(&self) {
        let a = exec_one(&self.input).unwrap();
        let b = exec_one(&self.expected).unwrap();
        assert_eq!(a, b, "while running\n{}", self.input);
    }

    fn exec_failure(&self) {
        let err = exec_one(&self.input).unwrap_err();
        let spn = err.span();
        let (offset, line, frag) = parse_loc(&self.expected);
        assert_eq!(
            (offset, line, frag),
            (spn.start, spn.line(&self.input), spn.slice(&self.input)),
            "while running\n{}",
            self.input
        );
    }
}

pub fn read_tests(path: impl AsRef<Path>) -> Vec<TestCase> {
    let text = std::fs::read_to_string(path).unwrap();
    let mut ret = Vec::new();
    let mut in_input = true;
    let mut cur = TestCase::default();

    fn separator_line(line: &str, ch: u8) -> bool {
        line.trim().len() >= 2 && line.trim().bytes().all(|c| c == ch)
    }

    for line in text.split_inclusive('\n') {
        if in_input {
            if separator_line(line, b'-') {
                in_input = false;
            } else {
                cur.input += line;
            }
        } else if separator_line(line, b'=') {
            in_input = true;
            ret.push(std::mem::take(&mut cur));
        } else {
            cur.expected += line;
        }
    }
    ret
}

#[test]
fn text_tests() {
    let tests = read_tests("tests/basic.txt");
    assert!(!tests.is_empty());
    for test in tests {
        test.exec();
    }
}

#[test]
fn exec_failures() {
    let tests = read_tests("tests/failures.txt");
    assert!(!tests.is_empty());
    for test in tests {
        test.exec_failure();
    }
}

#[test]
fn print_output() {
    let mut recorder = Recorder::default();
    seaturtle::run(
        "set x 5\nprint \"value is $x!\"\nprint \"$y\"\nprint x * x",
        &mut recorder,
    )
    .unwrap();
    assert_eq!(recorder.output(), ["value is 5!", "$y", "25"]);
}

#[test]
fn errors_have_locations() {
    let src = "forward 10\nrepeat 2\n  left 90\n";
    let err = seaturtle::parse(src).unwrap_err();
    assert!(matches!(err, seaturtle::Error::Parse(_)));
    assert_eq!(err.location(src), (4, 1));

    let src = "home\n  forward 1 / (2 - 2)";
    let mut recorder = Recorder::default();
    let err = seaturtle::run(src, &mut recorder).unwrap_err();
    assert_eq!(err.location(src), (2, 11));
    assert_eq!(err.to_string(), "division by zero");
}
