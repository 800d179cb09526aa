use crate::memory::WordMemory;
use log::debug;
use std::io::{self, Write};

// Pairs per output line
pub const PAIRS_PER_LINE: usize = 32;

/// Serializes the output buffer as space-separated 5-digit hex tokens
///
/// Words are emitted in swapped pairs (`word[i+1]` then `word[i]`) and a
/// line break follows every 32nd pair. Returns the number of words written.
pub fn write_results<O: Write, W: WordMemory>(
    out: &mut O,
    output: &W,
    count: usize,
) -> io::Result<usize> {
    let count = count.min(output.len()) & !1;

    for idx in (0..count).step_by(2) {
        write!(out, "{:05x} ", output.read(idx + 1))?;
        write!(out, "{:05x} ", output.read(idx))?;
        if idx % (2 * PAIRS_PER_LINE) == 2 * PAIRS_PER_LINE - 2 {
            writeln!(out)?;
        }
    }
    out.flush()?;

    debug!("Wrote {} result words", count);
    Ok(count)
}
