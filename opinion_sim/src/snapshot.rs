use bevy::prelude::*;
use opinion_schema::ObservationSnapshot;
use tracing::debug;

use crate::{error::SimError, resources::SessionFault};

/// Snapshots recorded so far, in session order.
#[derive(Resource, Default, Debug, Clone)]
pub struct ProtocolLog {
    snapshots: Vec<ObservationSnapshot>,
}

impl ProtocolLog {
    pub fn snapshots(&self) -> &[ObservationSnapshot] {
        &self.snapshots
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    fn push(&mut self, snapshot: ObservationSnapshot) {
        debug_assert_eq!(snapshot.session, self.snapshots.len() as u64);
        self.snapshots.push(snapshot);
    }
}

pub fn record_snapshot(
    In(result): In<Result<ObservationSnapshot, SimError>>,
    mut log: ResMut<ProtocolLog>,
    mut fault: ResMut<SessionFault>,
) {
    match result {
        Ok(snapshot) => {
            debug!(
                target: "opinion_sim::session",
                session = snapshot.session,
                disclaim_fraction = snapshot.disclaim_fraction,
                claimants = snapshot.claimants,
                "observation.recorded"
            );
            log.push(snapshot);
        }
        Err(error) => {
            tracing::error!(
                target: "opinion_sim::session",
                error = %error,
                "observation.failed"
            );
            fault.record(error);
        }
    }
}
