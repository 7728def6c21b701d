use std::io;

use rand::Rng;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};

use super::write_output;

pub const DEFAULT_ALIAS_PREFIX: &str = "No_Name";

/// Asks for an alias on `output` and reads one line from `input`.
pub async fn prompt_alias<I, O>(input: &mut I, output: &mut O) -> io::Result<String>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
{
    write_output(output, "Enter a user alias:").await?;
    let mut line = String::new();
    input.read_line(&mut line).await?;
    Ok(normalize_alias(&line))
}

/// Blank input becomes `No_Name<n>` with `n` below 10000.
pub fn normalize_alias(raw: &str) -> String {
    let alias = raw.trim_end_matches(['\n', '\r']);
    if alias.trim().is_empty() {
        let suffix = rand::thread_rng().gen_range(0..10_000);
        return format!("{DEFAULT_ALIAS_PREFIX}{suffix}");
    }
    alias.to_string()
}
