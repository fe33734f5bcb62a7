use super::GalaxyParams;

/// Serializes galaxy rebuilds.
///
/// Holds at most one pending snapshot. A request arriving while another is
/// still waiting replaces it, since only the newest parameters matter.
#[derive(Debug, Default)]
pub struct RegenerationQueue {
    pending: Option<GalaxyParams>,
    in_flight: bool,
    superseded: u32,
}

impl RegenerationQueue {
    pub fn request(&mut self, params: GalaxyParams) {
        if self.pending.replace(params).is_some() {
            self.superseded += 1;
        }
    }

    /// Hands out the pending snapshot if nothing is running, marking it in flight.
    pub fn start_next(&mut self) -> Option<GalaxyParams> {
        if self.in_flight {
            return None;
        }
        let params = self.pending.take()?;
        self.in_flight = true;
        Some(params)
    }

    pub fn finish(&mut self) {
        self.in_flight = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Requests dropped because a newer one replaced them before they started.
    pub fn superseded(&self) -> u32 {
        self.superseded
    }
}
