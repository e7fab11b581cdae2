use std::collections::VecDeque;
use std::io::{self, BufRead};

/// Where the `input` literal reads its line from.
pub trait LineSource {
    fn read_line(&mut self) -> io::Result<String>;
}

/// Blocking reads from the process stdin.
#[derive(Debug, Default)]
pub struct StdinLines;

impl LineSource for StdinLines {
    fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Pre-loaded lines, handed out in order.
#[derive(Debug, Default)]
pub struct ScriptedLines {
    lines: VecDeque<String>,
}

impl ScriptedLines {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { lines: lines.into_iter().map(Into::into).collect() }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
    }
}

impl LineSource for ScriptedLines {
    fn read_line(&mut self) -> io::Result<String> {
        self.lines.pop_front().ok_or_else(|| io::ErrorKind::UnexpectedEof.into())
    }
}
