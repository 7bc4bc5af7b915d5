use std::io::{BufRead, BufReader, BufWriter, Write};

use crate::error::{AppError, AppResult};

/// Newline-delimited JSON over stdio.
pub struct NdjsonIo {
    stdin: BufReader<std::io::Stdin>,
    stdout: BufWriter<std::io::Stdout>,
}

impl NdjsonIo {
    pub fn new() -> Self {
        Self {
            stdin: BufReader::new(std::io::stdin()),
            stdout: BufWriter::new(std::io::stdout()),
        }
    }

    /// One line of input, without the trailing newline. `None` on EOF.
    pub fn read_line(&mut self) -> AppResult<Option<String>> {
        let mut line = String::new();
        if self.stdin.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
    }

    pub fn write_json_line<T: serde::Serialize>(&mut self, v: &T) -> AppResult<()> {
        serde_json::to_writer(&mut self.stdout, v)?;
        self.stdout.write_all(b"\n")?;
        self.stdout.flush()?;
        Ok(())
    }

    /// Best-effort error reply for input that never parsed into a
    /// request envelope.
    pub fn protocol_error(&mut self, msg: String) -> AppResult<()> {
        let e = AppError::InvalidRequest(msg);
        self.write_json_line(&super::protocol::BridgeResponse::err(1, String::new(), &e))
    }
}
