use crate::constants::progress;
use crate::error::{ProtocolError, Result};
use crate::memory::WordMemory;
use crate::protocol::State;
use crate::shutdown::ShutdownSignal;
use crate::utils::{is_checkpoint, report_progress};

/// Streams `count` words from `input` through the slot window
///
/// Word `i` goes to slot `i % window.len()`, one write per word, in order.
/// There is no flow control: the device is expected to drain each slot
/// before it is overwritten.
pub fn stream_window<I: WordMemory, W: WordMemory>(
    input: &I,
    window: &mut W,
    count: usize,
    signal: &ShutdownSignal,
) -> Result<usize> {
    let slots = window.len();
    let count = count.min(input.len());
    if slots == 0 {
        return Ok(0);
    }

    for idx in 0..count {
        window.write(idx % slots, input.read(idx));

        let sent = idx + 1;
        if is_checkpoint(sent, progress::TRANSFER_EVERY_WORDS) {
            report_progress("Data transfer", sent, count);
            if signal.is_requested() {
                return Err(ProtocolError::Cancelled {
                    state: State::Transferring,
                });
            }
        }
    }
    report_progress("Data transfer", count, count);
    Ok(count)
}
