//! Interactive prompts written to stderr so stdout stays pipe-safe.

use std::io::{self, BufRead, Write};

use anyhow::Result;

use crate::convert::{self, Converter, Value};

/// Write `prompt` to stderr, read one line from stdin and convert it.
pub fn input_on_stderr(
    prompt: &str,
    default: Option<Value>,
    converter: Option<Converter>,
) -> Result<Option<Value>> {
    let stdin = io::stdin();
    let stderr = io::stderr();
    read_input(&mut stdin.lock(), &mut stderr.lock(), prompt, default, converter)
}

/// Prompt on `writer` and convert a single line read from `reader`.
///
/// End of input is treated like an empty answer.
pub fn read_input<R, W>(
    reader: &mut R,
    writer: &mut W,
    prompt: &str,
    default: Option<Value>,
    converter: Option<Converter>,
) -> Result<Option<Value>>
where
    R: BufRead,
    W: Write,
{
    write!(writer, "{prompt}")?;
    writer.flush()?;

    let mut line = String::new();
    reader.read_line(&mut line)?;
    let answer = line.trim_end_matches(['\r', '\n']);
    Ok(convert::convert(answer, default, converter)?)
}

/// Ask a yes/no question unless `assume_yes` is set.
pub fn confirm(prompt: &str, assume_yes: bool) -> Result<bool> {
    if assume_yes {
        return Ok(true);
    }
    let answer = input_on_stderr(prompt, Some(Value::Bool(false)), Some(Converter::Bool))?;
    Ok(answer.and_then(|v| v.as_bool()).unwrap_or(false))
}
