//! Join-code and link-code generation with bounded collision retry

use super::error::RoomError;

/// Characters that survive being read aloud or scribbled on a whiteboard:
/// no I/L/O/0/1.
const CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// How many collisions we tolerate before declaring the space too crowded
const MAX_ATTEMPTS: u32 = 10;

/// Default length for room join codes
pub const ROOM_CODE_LEN: usize = 6;

/// Default length for invite-link codes
pub const LINK_CODE_LEN: usize = 10;

/// Generates short unique codes against a caller-supplied uniqueness probe
#[derive(Debug, Clone, Copy)]
pub struct JoinCodeGenerator {
    length: usize,
}

impl JoinCodeGenerator {
    pub fn new(length: usize) -> Self {
        JoinCodeGenerator { length }
    }

    /// Produce one random candidate code
    pub fn candidate(&self) -> String {
        use rand::Rng;
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| {
                let idx = rng.random_range(0..CHARSET.len());
                CHARSET[idx] as char
            })
            .collect()
    }

    /// Produce a code the probe reports as unused.
    ///
    /// Each attempt is one short probe; no transaction is held across
    /// attempts. After `MAX_ATTEMPTS` collisions the operation fails with
    /// `ExhaustedRetries`, which callers surface rather than loop on.
    pub fn generate_unique<F>(&self, mut taken: F) -> Result<String, RoomError>
    where
        F: FnMut(&str) -> Result<bool, RoomError>,
    {
        for _ in 0..MAX_ATTEMPTS {
            let code = self.candidate();
            if !taken(&code)? {
                return Ok(code);
            }
        }
        Err(RoomError::ExhaustedRetries)
    }
}
