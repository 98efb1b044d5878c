//! Time-sortable 64-bit identifiers.
//!
//! An id is `millis_since_epoch << SEQUENCE_BITS | sequence`. Within one
//! process ids strictly increase, so ordering by id is ordering by creation.

use chrono::Utc;
use parking_lot::Mutex;

use crate::types::EntityId;

const SEQUENCE_BITS: u32 = 20;
const SEQUENCE_MASK: i64 = (1 << SEQUENCE_BITS) - 1;
// 2024-01-01T00:00:00Z
const EPOCH_MILLIS: i64 = 1_704_067_200_000;
/// Ids below `1 << SEQUENCE_BITS` are never generated; they stay free for
/// fixed rows such as the seeded admin.
const MIN_MILLIS: i64 = 1;

lazy_static! {
    static ref GENERATOR: IdGenerator = IdGenerator::new();
}

#[derive(Debug, Default)]
struct State {
    last_millis: i64,
    sequence: i64,
}

#[derive(Debug, Default)]
pub struct IdGenerator {
    state: Mutex<State>,
}

impl IdGenerator {
    pub fn new() -> Self {
        IdGenerator::default()
    }

    pub fn next_id(&self) -> EntityId {
        self.next_at(Utc::now().timestamp_millis() - EPOCH_MILLIS)
    }

    fn next_at(&self, now_millis: i64) -> EntityId {
        let now_millis = now_millis.max(MIN_MILLIS);
        let mut state = self.state.lock();
        if now_millis > state.last_millis {
            state.last_millis = now_millis;
            state.sequence = 0;
        } else {
            // Clock stalled or went backwards: keep counting from the last
            // timestamp, borrowing the next millisecond once it fills up.
            state.sequence += 1;
            if state.sequence > SEQUENCE_MASK {
                state.last_millis += 1;
                state.sequence = 0;
            }
        }
        (state.last_millis << SEQUENCE_BITS) | state.sequence
    }
}

/// Next id from the process-wide generator.
pub fn next_id() -> EntityId {
    GENERATOR.next_id()
}
