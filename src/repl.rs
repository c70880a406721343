use std::io::{self, BufRead, Write};

pub struct REPL {}

impl REPL {
    pub fn prompt(&self, pid: u32) -> Result<(), io::Error> {
        let mut stdout = io::stdout();
        write!(stdout, "vm[{}]> ", pid)?;
        stdout.flush()
    }

    /// Next trimmed line from stdin, `None` at end of input.
    pub fn read_line(&self) -> Result<Option<String>, io::Error> {
        let mut buffer = String::new();
        let stdin = io::stdin();
        if stdin.lock().read_line(&mut buffer)? == 0 {
            return Ok(None);
        }
        Ok(Some(buffer.trim().to_string()))
    }
}
