//! Message framing inside a shared memory region
//!
//! Layout:
//!
//! ```text
//! offset 0   magic "FCK1"
//! offset 4   state word (0 empty, 1 startup envelope, 2 result), atomic
//! offset 8   payload length, little-endian u64
//! offset 16  MessagePack payload
//! ```
//!
//! A writer retracts the state word, copies the payload, stores the length
//! and commits the new state last. A reader that sees the result state knows
//! the payload is complete; a worker that dies mid-write leaves the empty
//! state behind, which reads as "no result" rather than a corrupt result.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};

use super::shm::SharedRegion;
use crate::common::{Error, Result};

const MAGIC: [u8; 4] = *b"FCK1";
const STATE_OFFSET: usize = 4;
const LEN_OFFSET: usize = 8;
pub const HEADER_LEN: usize = 16;

/// What the region currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SlotState {
    Empty = 0,
    Startup = 1,
    Result = 2,
}

impl SlotState {
    fn from_word(word: u32) -> Option<Self> {
        match word {
            0 => Some(Self::Empty),
            1 => Some(Self::Startup),
            2 => Some(Self::Result),
            _ => None,
        }
    }
}

fn state_word(region: &SharedRegion) -> &AtomicU32 {
    // mmap returns page-aligned memory, so offset 4 is u32-aligned
    unsafe { &*(region.as_ptr().add(STATE_OFFSET) as *const AtomicU32) }
}

/// Bytes available for a payload in this region
pub fn capacity(region: &SharedRegion) -> usize {
    region.len().saturating_sub(HEADER_LEN)
}

/// Serialize `message` into the region and commit it as `state`
pub fn write_message<T: Serialize>(
    region: &mut SharedRegion,
    state: SlotState,
    message: &T,
) -> Result<()> {
    let payload = rmp_serde::to_vec(message)?;
    let capacity = capacity(region);
    if payload.len() > capacity {
        return Err(Error::ResultTooLarge {
            size: payload.len(),
            capacity,
        });
    }

    state_word(region).store(SlotState::Empty as u32, Ordering::Release);

    let bytes = region.as_mut_slice();
    bytes[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(&payload);
    bytes[..STATE_OFFSET].copy_from_slice(&MAGIC);
    bytes[LEN_OFFSET..HEADER_LEN].copy_from_slice(&(payload.len() as u64).to_le_bytes());

    state_word(region).store(state as u32, Ordering::Release);
    Ok(())
}

/// Current state of the region
pub fn read_state(region: &SharedRegion) -> Result<SlotState> {
    if region.len() < HEADER_LEN {
        return Err(Error::Protocol(format!(
            "region of {} bytes cannot hold a header",
            region.len()
        )));
    }
    let word = state_word(region).load(Ordering::Acquire);
    let state = SlotState::from_word(word)
        .ok_or_else(|| Error::Protocol(format!("unknown state word {:#x}", word)))?;

    if state != SlotState::Empty && region.as_slice()[..STATE_OFFSET] != MAGIC {
        return Err(Error::Protocol("missing magic bytes".to_string()));
    }
    Ok(state)
}

/// Decode the payload committed under `expected`
pub fn read_message<T: DeserializeOwned>(region: &SharedRegion, expected: SlotState) -> Result<T> {
    let state = read_state(region)?;
    if state != expected {
        return Err(Error::Protocol(format!(
            "expected {:?} message, region holds {:?}",
            expected, state
        )));
    }

    let bytes = region.as_slice();
    let mut len_buf = [0u8; 8];
    len_buf.copy_from_slice(&bytes[LEN_OFFSET..HEADER_LEN]);
    let len = u64::from_le_bytes(len_buf) as usize;

    if len > capacity(region) {
        return Err(Error::Protocol(format!(
            "payload length {} exceeds region capacity {}",
            len,
            capacity(region)
        )));
    }

    Ok(rmp_serde::from_slice(&bytes[HEADER_LEN..HEADER_LEN + len])?)
}
