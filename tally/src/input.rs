use std::io::{self, Read};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line is not terminated")]
    Unterminated,
    #[error("line is empty")]
    Empty,
    #[error("invalid value '{0}'")]
    InvalidValue(String),
    #[error("line is longer than {0} bytes")]
    TooLong(usize),
}

/// One update from the producer: `<value>[ <style>]\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub value: u64,
    pub style: Option<String>,
}

pub fn parse(line: &str) -> Result<Command, ParseError> {
    let Some((body, _)) = line.split_once('\n') else {
        return Err(ParseError::Unterminated);
    };
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    let (digits, style) = match body.find(char::is_whitespace) {
        Some(i) => {
            let sep = body[i..].chars().next().map_or(1, char::len_utf8);
            (&body[..i], &body[i + sep..])
        }
        None => (body, ""),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidValue(digits.to_string()));
    }
    // digits only, so parsing can only fail on overflow
    let value = digits.parse::<u64>().unwrap_or(u64::MAX);
    let style = (!style.is_empty()).then(|| style.to_string());

    Ok(Command { value, style })
}

// --- Line splitting ---

const READ_CHUNK: usize = 4096;

/// Longest accepted line, newline included.
pub const MAX_LINE_LENGTH: usize = 255;

/// Accumulates bytes from a readable source and hands out complete lines.
#[derive(Default)]
pub struct LineReader {
    pending: Vec<u8>,
}

impl LineReader {
    /// Performs one read. Returns `false` once the source reached end of input.
    pub fn fill<R: Read>(&mut self, src: &mut R) -> io::Result<bool> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match src.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    self.pending.extend_from_slice(&chunk[..n]);
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(true),
                Err(e) => return Err(e),
            }
        }
    }

    /// Next complete line, terminator included. A line that cannot fit in
    /// [`MAX_LINE_LENGTH`] bytes is an error, terminated or not.
    pub fn next_line(&mut self) -> Result<Option<String>, ParseError> {
        let Some(end) = self.pending.iter().position(|&b| b == b'\n') else {
            if self.pending.len() > MAX_LINE_LENGTH {
                self.pending.clear();
                return Err(ParseError::TooLong(MAX_LINE_LENGTH));
            }
            return Ok(None);
        };
        let line: Vec<u8> = self.pending.drain(..=end).collect();
        if line.len() > MAX_LINE_LENGTH {
            return Err(ParseError::TooLong(MAX_LINE_LENGTH));
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Bytes that never got a terminator.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(value: u64, style: Option<&str>) -> String {
        match style {
            Some(s) => format!("{value} {s}\n"),
            None => format!("{value}\n"),
        }
    }

    #[test]
    fn value_only() {
        assert_eq!(parse("25\n"), Ok(Command { value: 25, style: None }));
    }

    #[test]
    fn value_and_style() {
        assert_eq!(parse("25 muted\n"), Ok(Command { value: 25, style: Some("muted".into()) }));
    }

    #[test]
    fn round_trips_over_values_and_styles() {
        for value in [0, 1, 50, 99, 100, 101, 65535, u32::MAX as u64] {
            assert_eq!(parse(&format(value, None)).unwrap(), Command { value, style: None });
            for style in ["a", "muted", "x-y_z", "ünïcode", "#ff0000"] {
                let cmd = parse(&format(value, Some(style))).unwrap();
                assert_eq!(cmd, Command { value, style: Some(style.to_string()) });
            }
        }
    }

    #[test]
    fn rejects_unterminated_and_empty() {
        assert_eq!(parse(""), Err(ParseError::Unterminated));
        assert_eq!(parse("25"), Err(ParseError::Unterminated));
        assert_eq!(parse("25 muted"), Err(ParseError::Unterminated));
        assert_eq!(parse("\n"), Err(ParseError::Empty));
    }

    #[test]
    fn rejects_non_digits() {
        assert_eq!(parse("abc\n"), Err(ParseError::InvalidValue("abc".into())));
        assert_eq!(parse("25x\n"), Err(ParseError::InvalidValue("25x".into())));
        assert_eq!(parse("-5\n"), Err(ParseError::InvalidValue("-5".into())));
        assert_eq!(parse("+5\n"), Err(ParseError::InvalidValue("+5".into())));
        assert_eq!(parse(" 5\n"), Err(ParseError::InvalidValue("".into())));
    }

    #[test]
    fn huge_values_saturate() {
        assert_eq!(parse("18446744073709551615\n").unwrap().value, u64::MAX);
        assert_eq!(parse("99999999999999999999999 muted\n"), Ok(Command { value: u64::MAX, style: Some("muted".into()) }));
    }

    #[test]
    fn separator_only_means_default_style() {
        assert_eq!(parse("25 \n"), Ok(Command { value: 25, style: None }));
    }

    #[test]
    fn style_is_taken_verbatim() {
        assert_eq!(parse("25 dark mode\n").unwrap().style.as_deref(), Some("dark mode"));
        assert_eq!(parse("25\tx \n").unwrap().style.as_deref(), Some("x "));
    }

    #[test]
    fn splits_lines_across_reads() {
        let mut reader = LineReader::default();
        let mut src: &[u8] = b"10\n20 mu";
        assert!(reader.fill(&mut src).unwrap());
        assert_eq!(reader.next_line(), Ok(Some("10\n".into())));
        assert_eq!(reader.next_line(), Ok(None));

        let mut src: &[u8] = b"ted\n30\n";
        assert!(reader.fill(&mut src).unwrap());
        assert_eq!(reader.next_line(), Ok(Some("20 muted\n".into())));
        assert_eq!(reader.next_line(), Ok(Some("30\n".into())));
        assert_eq!(reader.next_line(), Ok(None));
        assert_eq!(reader.take_remainder(), None);
    }

    #[test]
    fn reports_eof_and_leftover() {
        let mut reader = LineReader::default();
        let mut src: &[u8] = b"40";
        assert!(reader.fill(&mut src).unwrap());
        assert!(!reader.fill(&mut src).unwrap());
        assert_eq!(reader.next_line(), Ok(None));
        let rest = reader.take_remainder().unwrap();
        assert_eq!(parse(&rest), Err(ParseError::Unterminated));
    }

    #[test]
    fn overlong_lines_are_rejected() {
        let mut reader = LineReader::default();
        let long = format!("{}\n", "1".repeat(MAX_LINE_LENGTH));
        let mut src = long.as_bytes();
        while reader.fill(&mut src).unwrap() {}
        assert_eq!(reader.next_line(), Err(ParseError::TooLong(MAX_LINE_LENGTH)));

        let mut reader = LineReader::default();
        let fits = format!("{} x\n", "1".repeat(MAX_LINE_LENGTH - 3));
        let mut src = fits.as_bytes();
        while reader.fill(&mut src).unwrap() {}
        assert_eq!(reader.next_line().unwrap().map(|l| l.len()), Some(MAX_LINE_LENGTH));
    }

    #[test]
    fn runaway_line_without_newline_is_rejected() {
        let mut reader = LineReader::default();
        let mut src: &[u8] = &[b'7'; MAX_LINE_LENGTH];
        assert!(reader.fill(&mut src).unwrap());
        assert_eq!(reader.next_line(), Ok(None));
        let mut more: &[u8] = b"7";
        assert!(reader.fill(&mut more).unwrap());
        assert_eq!(reader.next_line(), Err(ParseError::TooLong(MAX_LINE_LENGTH)));
        assert_eq!(reader.take_remainder(), None);
    }
}
