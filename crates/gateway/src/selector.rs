//! Candidate selection: capability filtering and the weighted draw.

use rand::Rng;

use crate::catalog::{Binding, Capabilities, Settings};
use crate::error::GatewayError;

/// Produce the ordered candidate list for one request.
///
/// The ordering is drawn up front, without replacement, with probability
/// proportional to each binding's weight. The list is a private snapshot;
/// concurrent requests draw independently.
pub(crate) fn order_candidates<R: Rng>(
    bindings: Vec<Binding>,
    required: Capabilities,
    settings: &Settings,
    max_attempts: u32,
    rng: &mut R,
) -> Result<Vec<Binding>, GatewayError> {
    let eligible: Vec<Binding> = bindings
        .into_iter()
        .filter(|binding| binding.is_enabled() && capability_match(binding.capabilities, required, settings))
        .collect();

    if eligible.is_empty() {
        return Err(GatewayError::NoCandidate);
    }

    let mut pool: Vec<(Binding, i64)> = eligible
        .into_iter()
        .map(|binding| {
            let tickets = binding.weight.max(0);
            (binding, tickets)
        })
        .collect();

    let cap = max_attempts.max(1) as usize;
    let mut ordered = Vec::with_capacity(cap.min(pool.len()));

    while !pool.is_empty() && ordered.len() < cap {
        let total: i64 = pool.iter().map(|(_, tickets)| *tickets).sum();

        let picked = if total == 0 {
            // Only zero-weight candidates remain; each counts as one ticket.
            rng.random_range(0..pool.len())
        } else {
            let mut ticket = rng.random_range(0..total);
            let mut index = pool.len() - 1;

            for (i, (_, tickets)) in pool.iter().enumerate() {
                if ticket < *tickets {
                    index = i;
                    break;
                }
                ticket -= *tickets;
            }

            index
        };

        ordered.push(pool.swap_remove(picked).0);
    }

    Ok(ordered)
}

fn capability_match(offered: Capabilities, required: Capabilities, settings: &Settings) -> bool {
    if settings.strict_capability_match {
        offered == required
    } else {
        offered.covers(required)
    }
}
