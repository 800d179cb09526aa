use crate::constants::{progress, CUBE_RECORDS, RECORD_BITS, WORDS_PER_RECORD, WORD_BITS};
use crate::error::{ProtocolError, Result};
use crate::memory::WordMemory;
use crate::protocol::State;
use crate::shutdown::ShutdownSignal;
use crate::utils::{is_checkpoint, report_progress};
use log::{debug, warn};
use std::io::{BufRead, Write};

/// Outcome of packing one input artifact
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub records: usize, // Records written to the input buffer
    pub words: usize,   // Words written to the input buffer
    pub irregular: usize, // Records whose length was not RECORD_BITS
    pub ignored: usize, // Records past the buffer capacity
}

/// Packs one textual record MSB-first into 16 words
///
/// Only '1' sets a bit; every other byte, and any position past the end of a
/// short record, is a zero.
pub fn pack_record(bytes: &[u8]) -> [u32; WORDS_PER_RECORD] {
    let mut words = [0u32; WORDS_PER_RECORD];
    let mut acc: u32 = 0;

    for bit in 0..RECORD_BITS {
        acc <<= 1;
        if bytes.get(bit) == Some(&b'1') {
            acc |= 1;
        }
        if bit % WORD_BITS == WORD_BITS - 1 {
            words[bit / WORD_BITS] = acc;
            acc = 0;
        }
    }
    words
}

/// Inverse of `pack_record`
pub fn unpack_record(words: &[u32]) -> String {
    let mut record = String::with_capacity(words.len() * WORD_BITS);
    for word in words {
        for shift in (0..WORD_BITS).rev() {
            record.push(if (word >> shift) & 1 == 1 { '1' } else { '0' });
        }
    }
    record
}

/// Streams records from `reader` into `input`, 16 words per record
///
/// Stops early only on a read error or a shutdown request. Records that do
/// not fit the buffer are counted and skipped.
pub fn pack_cube<R: BufRead, W: WordMemory>(
    reader: R,
    input: &mut W,
    signal: &ShutdownSignal,
) -> Result<PackSummary> {
    let capacity = (input.len() / WORDS_PER_RECORD).min(CUBE_RECORDS);
    let mut summary = PackSummary::default();

    // Raw bytes: a record is not required to be valid UTF-8
    for line in reader.split(b'\n') {
        let mut line = line.map_err(ProtocolError::InputRead)?;
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        if summary.records == capacity {
            summary.ignored += 1;
            continue;
        }
        if line.len() != RECORD_BITS {
            debug!("Record {} has {} bytes", summary.records, line.len());
            summary.irregular += 1;
        }

        let base = summary.records * WORDS_PER_RECORD;
        for (offset, word) in pack_record(&line).iter().enumerate() {
            input.write(base + offset, *word);
        }
        summary.records += 1;
        summary.words += WORDS_PER_RECORD;

        if is_checkpoint(summary.records, progress::PACK_EVERY_RECORDS) {
            report_progress("Reading input", summary.records, CUBE_RECORDS);
            if signal.is_requested() {
                return Err(ProtocolError::Cancelled {
                    state: State::Transferring,
                });
            }
        }
    }
    report_progress("Reading input", summary.records, CUBE_RECORDS);

    if summary.irregular > 0 {
        warn!(
            "{} records were not {} characters long",
            summary.irregular, RECORD_BITS
        );
    }
    if summary.ignored > 0 {
        warn!(
            "Ignored {} records past the {}-record cube",
            summary.ignored, capacity
        );
    }
    Ok(summary)
}

/// Writes `count` words as `%08x ` tokens, 16 per line
pub fn dump_words<O: Write, W: WordMemory>(
    out: &mut O,
    words: &W,
    count: usize,
) -> std::io::Result<()> {
    for idx in 0..count.min(words.len()) {
        write!(out, "{:08x} ", words.read(idx))?;
        if idx % WORDS_PER_RECORD == WORDS_PER_RECORD - 1 {
            writeln!(out)?;
        }
    }
    out.flush()
}
