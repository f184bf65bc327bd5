//! Collision-resistant entity identifiers and their allocator.
//!
//! Ids are 64 bytes from the thread-local CSPRNG rendered as 128 lowercase hex characters.
//! Collisions are astronomically unlikely, but the allocator still treats a uniqueness
//! violation as a normal outcome: the candidate is discarded and a fresh one is tried, up to a
//! bounded number of attempts.

use std::collections::VecDeque;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::OvoError;

/// Number of random bytes behind every id.
pub const ID_BYTES: usize = 64;
/// Length of the rendered id.
pub const ID_LEN: usize = ID_BYTES * 2;
/// Default cap on allocation attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

///////////////////////////////////////////// EntityId /////////////////////////////////////////////

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    pub fn from_bytes(bytes: &[u8; ID_BYTES]) -> Self {
        EntityId(encode_hex(bytes))
    }

    pub fn random() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        EntityId::from_bytes(&bytes)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Rows written by this crate only ever hold validated ids.
    pub(crate) fn from_trusted(s: String) -> Self {
        EntityId(s)
    }
}

const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

fn encode_hex(input: &[u8]) -> String {
    let mut result = String::with_capacity(input.len() * 2);
    for byte in input {
        result.push(HEX_CHARS[(byte >> 4) as usize] as char);
        result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
    }
    result
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityIdParseError {
    InvalidLength(usize),
    InvalidCharacter(char),
}

impl Display for EntityIdParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            EntityIdParseError::InvalidLength(len) => write!(
                f,
                "Entity id must be exactly {} hex characters, got {}",
                ID_LEN, len
            ),
            EntityIdParseError::InvalidCharacter(c) => {
                write!(f, "Entity id contains non-hex character {:?}", c)
            }
        }
    }
}

impl std::error::Error for EntityIdParseError {}

impl From<EntityIdParseError> for OvoError {
    fn from(e: EntityIdParseError) -> Self {
        OvoError::Validation(e.to_string())
    }
}

impl FromStr for EntityId {
    type Err = EntityIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != ID_LEN {
            return Err(EntityIdParseError::InvalidLength(s.len()));
        }
        if let Some(c) = s
            .chars()
            .find(|c| !matches!(c, '0'..='9' | 'a'..='f'))
        {
            return Err(EntityIdParseError::InvalidCharacter(c));
        }
        Ok(EntityId(s.to_string()))
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

///////////////////////////////////////////// IdSource /////////////////////////////////////////////

/// Source of candidate ids.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> EntityId;
}

/// Candidates drawn from the thread-local CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_id(&self) -> EntityId {
        EntityId::random()
    }
}

/// Hands out a fixed script of candidates, then falls back to random ids.
///
/// Used to replay allocation sequences deterministically.
#[derive(Debug, Default)]
pub struct ScriptedIds {
    script: Mutex<VecDeque<EntityId>>,
}

impl ScriptedIds {
    pub fn new(script: impl IntoIterator<Item = EntityId>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }
}

impl IdSource for ScriptedIds {
    fn next_id(&self) -> EntityId {
        let next = match self.script.lock() {
            Ok(mut script) => script.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(EntityId::random)
    }
}

//////////////////////////////////////////// IdAllocator ///////////////////////////////////////////

/// Allocates ids by compare-and-insert.
///
/// The caller supplies the insert; a [`OvoError::AlreadyExists`] outcome discards the
/// candidate and retries, any other error is returned untouched.
#[derive(Clone)]
pub struct IdAllocator {
    source: Arc<dyn IdSource>,
    max_attempts: u32,
}

impl IdAllocator {
    pub fn new(source: Arc<dyn IdSource>, max_attempts: u32) -> Self {
        Self {
            source,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn allocate<F, Fut>(&self, mut insert: F) -> Result<EntityId, OvoError>
    where
        F: FnMut(EntityId) -> Fut,
        Fut: Future<Output = Result<(), OvoError>>,
    {
        for attempt in 1..=self.max_attempts {
            let candidate = self.source.next_id();
            match insert(candidate.clone()).await {
                Ok(()) => return Ok(candidate),
                Err(e) if e.is_conflict() => {
                    tracing::debug!(attempt, "id collision, retrying with a fresh candidate");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::error!(
            attempts = self.max_attempts,
            "id allocation exhausted; the store keeps rejecting fresh ids"
        );
        Err(OvoError::IdsExhausted(self.max_attempts))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(Arc::new(RandomIds), DEFAULT_MAX_ATTEMPTS)
    }
}

impl std::fmt::Debug for IdAllocator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("IdAllocator")
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}
