use crate::application::ports::{Connection, EventFilter, SubscribeError};
use crate::domain::{FromPoint, SequenceId};

/// Owns the subscription cursor. Re-subscription after a drop resumes from
/// the last known-good point instead of re-scanning history.
///
/// The cursor only ever moves forward, and only after a batch has been
/// processed. A failure between poll and advance therefore re-delivers that
/// batch on the next session: at-least-once, by contract.
pub struct OccurrenceFilterState {
    address: String,
    event_name: String,
    cursor: FromPoint,
}

impl OccurrenceFilterState {
    pub fn new(address: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            event_name: event_name.into(),
            cursor: FromPoint::Latest,
        }
    }

    pub fn from_point(&self) -> FromPoint {
        self.cursor
    }

    /// Open a fresh filter at the current cursor.
    pub async fn open(
        &self,
        connection: &dyn Connection,
    ) -> Result<Box<dyn EventFilter>, SubscribeError> {
        connection
            .subscribe(&self.address, &self.event_name, self.cursor)
            .await
    }

    /// Move the cursor past a processed position. Stale positions are
    /// ignored so the cursor never moves backwards.
    pub fn advance_past(&mut self, sequence: SequenceId) {
        match self.cursor {
            FromPoint::Latest => self.cursor = FromPoint::After(sequence),
            FromPoint::After(current) if sequence > current => {
                self.cursor = FromPoint::After(sequence)
            }
            FromPoint::After(_) => {}
        }
    }
}
