use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use crate::value::Value;

/// Character cursor behind `cin >>`. Each read takes only the characters its
/// target type accepts and leaves the rest for the next read.
pub struct Input {
    reader: Box<dyn BufRead>,
    line: Vec<char>,
    pos: usize,
}

impl Input {
    pub fn new(reader: Box<dyn BufRead>) -> Self {
        Self {
            reader,
            line: Vec::new(),
            pos: 0,
        }
    }

    pub fn from_string(text: &str) -> Self {
        Self::new(Box::new(io::Cursor::new(text.to_string().into_bytes())))
    }

    pub fn empty() -> Self {
        Self::new(Box::new(io::empty()))
    }

    // Skip whitespace, pulling in lines as needed. `false` at end of input.
    fn skip_blanks(&mut self) -> io::Result<bool> {
        loop {
            while let Some(c) = self.line.get(self.pos) {
                if !c.is_whitespace() {
                    return Ok(true);
                }
                self.pos += 1;
            }
            let mut text = String::new();
            if self.reader.read_line(&mut text)? == 0 {
                return Ok(false);
            }
            self.line = text.chars().collect();
            self.pos = 0;
        }
    }

    fn rest(&self) -> &[char] {
        self.line.get(self.pos..).unwrap_or(&[])
    }

    /// Consume the first `len` characters if `parse` accepts them.
    fn take_if<F>(&mut self, len: usize, parse: F) -> Option<Value>
    where
        F: FnOnce(&str) -> Option<Value>,
    {
        if len == 0 {
            return None;
        }
        let text: String = self.rest().iter().take(len).collect();
        let value = parse(&text)?;
        self.pos += len;
        Some(value)
    }

    /// Next whitespace-delimited word, or `None` at end of input.
    pub fn next_word(&mut self) -> io::Result<Option<String>> {
        if !self.skip_blanks()? {
            return Ok(None);
        }
        let len = self.rest().iter().take_while(|c| !c.is_whitespace()).count();
        let word: String = self.rest().iter().take(len).collect();
        self.pos += len;
        Ok(Some(word))
    }

    /// Read one value shaped like `current`. `None` leaves the variable
    /// unchanged and consumes nothing but leading whitespace.
    pub fn read_like(&mut self, current: &Value) -> io::Result<Option<Value>> {
        if let Value::String(_) = current {
            return Ok(self.next_word()?.map(Value::String));
        }
        if !self.skip_blanks()? {
            return Ok(None);
        }
        let rest = self.rest();
        let value = match current {
            Value::Int(_) => {
                let len = int_prefix(rest);
                self.take_if(len, |t| t.parse().ok().map(Value::Int))
            }
            Value::Float(_) => {
                let len = float_prefix(rest);
                self.take_if(len, |t| t.parse().ok().map(Value::Float))
            }
            Value::Double(_) => {
                let len = float_prefix(rest);
                self.take_if(len, |t| t.parse().ok().map(Value::Double))
            }
            Value::Bool(_) => {
                let len = match rest.first() {
                    Some(c) if c.is_ascii_alphabetic() => {
                        rest.iter().take_while(|c| c.is_ascii_alphabetic()).count()
                    }
                    _ => int_prefix(rest),
                };
                self.take_if(len, |t| match t {
                    "1" | "true" => Some(Value::Bool(true)),
                    "0" | "false" => Some(Value::Bool(false)),
                    _ => None,
                })
            }
            Value::Char(_) => self.take_if(1, |t| t.chars().next().map(Value::Char)),
            _ => None,
        };
        Ok(value)
    }
}

fn digits(chars: &[char]) -> usize {
    chars.iter().take_while(|c| c.is_ascii_digit()).count()
}

fn sign(chars: &[char]) -> usize {
    usize::from(matches!(chars.first(), Some('+' | '-')))
}

/// Length of the longest integer prefix, 0 if there is none.
fn int_prefix(chars: &[char]) -> usize {
    let s = sign(chars);
    match digits(&chars[s..]) {
        0 => 0,
        n => s + n,
    }
}

/// Length of the longest floating-point prefix (`-1.5e3`, `.5`, `2.`).
fn float_prefix(chars: &[char]) -> usize {
    let mut len = sign(chars);
    let whole = digits(&chars[len..]);
    len += whole;
    let mut frac = 0;
    if chars.get(len) == Some(&'.') {
        frac = digits(&chars[len + 1..]);
        len += 1 + frac;
    }
    if whole + frac == 0 {
        return 0;
    }
    if matches!(chars.get(len), Some('e' | 'E')) {
        let at = len + 1;
        let s = sign(&chars[at..]);
        let exp = digits(&chars[at + s..]);
        if exp > 0 {
            len = at + s + exp;
        }
    }
    len
}

/// In-memory sink shared between an interpreter and whoever drains it.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return and clear everything written so far.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.borrow_mut());
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_span_lines() {
        let mut input = Input::from_string("  3 4\n\n  five\n");
        assert_eq!(input.next_word().unwrap().as_deref(), Some("3"));
        assert_eq!(input.next_word().unwrap().as_deref(), Some("4"));
        assert_eq!(input.next_word().unwrap().as_deref(), Some("five"));
        assert_eq!(input.next_word().unwrap(), None);
    }

    #[test]
    fn parses_by_target_type() {
        let mut input = Input::from_string("42 2.5 true x hello");
        assert_eq!(
            input.read_like(&Value::Int(0)).unwrap(),
            Some(Value::Int(42))
        );
        assert_eq!(
            input.read_like(&Value::Double(0.0)).unwrap(),
            Some(Value::Double(2.5))
        );
        assert_eq!(
            input.read_like(&Value::Bool(false)).unwrap(),
            Some(Value::Bool(true))
        );
        assert_eq!(
            input.read_like(&Value::Char('\0')).unwrap(),
            Some(Value::Char('x'))
        );
        assert_eq!(
            input.read_like(&Value::String(String::new())).unwrap(),
            Some(Value::String("hello".into()))
        );
        assert_eq!(input.read_like(&Value::Int(0)).unwrap(), None);
    }

    #[test]
    fn chars_are_read_one_at_a_time() {
        let mut input = Input::from_string("xy\n z");
        let c = Value::Char('\0');
        assert_eq!(input.read_like(&c).unwrap(), Some(Value::Char('x')));
        assert_eq!(input.read_like(&c).unwrap(), Some(Value::Char('y')));
        assert_eq!(input.read_like(&c).unwrap(), Some(Value::Char('z')));
        assert_eq!(input.read_like(&c).unwrap(), None);
    }

    #[test]
    fn numbers_take_the_longest_prefix() {
        let mut input = Input::from_string("12,34 -7.5e2x 3.");
        assert_eq!(
            input.read_like(&Value::Int(0)).unwrap(),
            Some(Value::Int(12))
        );
        // the comma stays in place, so this read fails without consuming it
        assert_eq!(input.read_like(&Value::Int(0)).unwrap(), None);
        assert_eq!(
            input.read_like(&Value::Char('\0')).unwrap(),
            Some(Value::Char(','))
        );
        assert_eq!(
            input.read_like(&Value::Int(0)).unwrap(),
            Some(Value::Int(34))
        );
        assert_eq!(
            input.read_like(&Value::Double(0.0)).unwrap(),
            Some(Value::Double(-750.0))
        );
        assert_eq!(
            input.read_like(&Value::String(String::new())).unwrap(),
            Some(Value::String("x".into()))
        );
        assert_eq!(
            input.read_like(&Value::Float(0.0)).unwrap(),
            Some(Value::Float(3.0))
        );
    }

    #[test]
    fn bad_input_is_rejected() {
        let mut input = Input::from_string("abc");
        assert_eq!(input.read_like(&Value::Int(0)).unwrap(), None);
        assert_eq!(input.read_like(&Value::Bool(false)).unwrap(), None);
        assert_eq!(
            input.read_like(&Value::String(String::new())).unwrap(),
            Some(Value::String("abc".into()))
        );
    }

    #[test]
    fn shared_buffer_drains() {
        let buf = SharedBuffer::new();
        let mut w = buf.clone();
        write!(w, "a{}", 1).unwrap();
        assert_eq!(buf.take(), "a1");
        assert_eq!(buf.take(), "");
    }
}
