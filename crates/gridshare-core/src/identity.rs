//! Session identifier generation.
//!
//! Identifiers are 10 alphanumeric characters drawn from one process-wide
//! generator. Uniqueness is probabilistic only (62^10 possibilities); the room
//! registry does not guard against collisions.

use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::distr::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Opaque identifier of a connected session.
pub type SessionId = String;

/// Length of every generated session identifier.
pub const SESSION_ID_LEN: usize = 10;

/// Produces session identifiers from a single shared, seeded generator.
///
/// The generator state sits behind a mutex so concurrent connection tasks
/// can call [`IdGenerator::next_id`] through a shared reference.
pub struct IdGenerator {
    rng: Mutex<StdRng>,
}

impl IdGenerator {
    /// Seed once from the wall clock.
    pub fn from_time_seed() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        Self::with_seed(seed)
    }

    /// Deterministic generator, mainly for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Draw the next identifier.
    pub fn next_id(&self) -> SessionId {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..SESSION_ID_LEN)
            .map(|_| char::from(rng.sample(Alphanumeric)))
            .collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::from_time_seed()
    }
}

/// Returns true if `id` has the shape of a generated identifier.
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == SESSION_ID_LEN && id.bytes().all(|b| b.is_ascii_alphanumeric())
}
