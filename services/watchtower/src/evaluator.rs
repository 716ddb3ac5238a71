//! Status evaluation: turns a probe result into a status

use crate::probe::ProbeResult;
use crate::status::Status;

/// Classify a probe result.
///
/// Maintenance is an administrative override and wins over any probe
/// outcome. `previous` does not influence the result; it is accepted so
/// callers that damp flapping can share the signature.
pub fn evaluate(_previous: Option<Status>, maintenance: bool, result: &ProbeResult) -> Status {
    if maintenance {
        Status::Maintenance
    } else if result.success {
        Status::Up
    } else {
        Status::Down
    }
}

/// Flap damping: a new status is only accepted after `required` consecutive
/// identical classifications. Maintenance is always accepted immediately.
#[derive(Debug, Clone)]
pub struct Debouncer {
    required: u32,
    candidate: Option<(Status, u32)>,
}

impl Debouncer {
    pub fn new(required: u32) -> Self {
        Self {
            required: required.max(1),
            candidate: None,
        }
    }

    /// Feed a fresh classification and return the status to store.
    pub fn observe(&mut self, current: Option<Status>, classified: Status) -> Status {
        let Some(current) = current else {
            self.candidate = None;
            return classified;
        };

        if classified == current || classified == Status::Maintenance || self.required == 1 {
            self.candidate = None;
            return classified;
        }

        let count = match self.candidate {
            Some((status, count)) if status == classified => count + 1,
            _ => 1,
        };

        if count >= self.required {
            self.candidate = None;
            classified
        } else {
            self.candidate = Some((classified, count));
            current
        }
    }
}
