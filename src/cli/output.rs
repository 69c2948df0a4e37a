use std::io::Write;

use serde::Serialize;

use crate::error::AppError;

/// Print `response` as indented JSON on stdout.
pub fn print_response<T: Serialize>(response: &T) -> Result<(), AppError> {
    let mut stdout = std::io::stdout().lock();
    write_response(&mut stdout, response)
}

pub fn write_response<W: Write, T: Serialize>(out: &mut W, response: &T) -> Result<(), AppError> {
    serde_json::to_writer_pretty(&mut *out, response)?;
    writeln!(out)?;
    Ok(())
}

/// Report a failed command on stderr, as `{error, kind}` JSON when `json` is set.
pub fn print_error(err: &AppError, json: bool) {
    let mut stderr = std::io::stderr().lock();
    write_error(&mut stderr, err, json);
}

pub fn write_error<W: Write>(out: &mut W, err: &AppError, json: bool) {
    let rendered = if json {
        serde_json::to_string(err).unwrap_or_else(|_| err.to_string())
    } else {
        format!("Error: {}", err)
    };
    let _ = writeln!(out, "{}", rendered);
}
