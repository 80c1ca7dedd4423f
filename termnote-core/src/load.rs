//! Asynchronous document loading with supersession.
//!
//! Each selection gets a [`LoadTicket`]. Only the completion carrying the
//! newest ticket is applied; anything older belongs to a selection the user
//! has already replaced or cleared.

use std::sync::Arc;

use tracing::instrument;

use crate::error::LoadError;
use crate::{DocumentBackend, DocumentProvider, DocumentSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn generation(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct LoadTracker {
    generation: u64,
}

impl LoadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> LoadTicket {
        self.generation += 1;
        LoadTicket(self.generation)
    }

    /// Supersedes every outstanding ticket without issuing a new one.
    pub fn invalidate(&mut self) {
        self.generation += 1;
    }

    pub fn is_current(&self, ticket: LoadTicket) -> bool {
        ticket.0 == self.generation
    }
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub ticket: LoadTicket,
    pub source: DocumentSource,
}

pub enum LoadOutcome {
    Success(Arc<dyn DocumentBackend>),
    Failure(LoadError),
}

impl LoadOutcome {
    pub fn page_count(&self) -> Option<usize> {
        match self {
            LoadOutcome::Success(backend) => Some(backend.info().page_count),
            LoadOutcome::Failure(_) => None,
        }
    }
}

impl std::fmt::Debug for LoadOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadOutcome::Success(backend) => f
                .debug_tuple("Success")
                .field(&backend.info().page_count)
                .finish(),
            LoadOutcome::Failure(err) => f.debug_tuple("Failure").field(err).finish(),
        }
    }
}

#[derive(Debug)]
pub struct LoadCompletion {
    pub ticket: LoadTicket,
    pub outcome: LoadOutcome,
}

/// Runs the provider for `request`. A document without pages is reported as
/// [`LoadError::Empty`].
#[instrument(skip(provider, request), fields(source = %request.source.display_name(), generation = request.ticket.generation()))]
pub async fn resolve_load<P>(provider: &P, request: LoadRequest) -> LoadCompletion
where
    P: DocumentProvider + ?Sized,
{
    let outcome = match provider.open(&request.source).await {
        Ok(backend) if backend.info().page_count == 0 => LoadOutcome::Failure(LoadError::Empty),
        Ok(backend) => LoadOutcome::Success(backend),
        Err(err) => LoadOutcome::Failure(err),
    };
    LoadCompletion {
        ticket: request.ticket,
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_ticket_is_the_only_current_one() {
        let mut tracker = LoadTracker::new();
        let first = tracker.begin();
        let second = tracker.begin();
        assert!(!tracker.is_current(first));
        assert!(tracker.is_current(second));

        tracker.invalidate();
        assert!(!tracker.is_current(second));
    }
}
