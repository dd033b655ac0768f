//! Identity assignment: sequential ids and adjective-animal agent ids.
//!
//! Both functions must run while the base directory lock is held, right
//! after a fresh scan — a stale view of existing worktrees would hand out
//! duplicate ids.

use std::collections::HashSet;

use rand::prelude::*;

use crate::metadata::ScannedWorktree;

// Word lists sized well beyond any realistic number of live worktrees,
// so random draws rarely collide.

pub const ADJECTIVES: &[&str] = &[
    "agile", "amber", "ashen", "bold", "brave", "bright", "brisk", "calm", "candid", "cedar",
    "clever", "cool", "crisp", "daring", "deft", "dusky", "eager", "early", "fabled", "fair",
    "fleet", "frosty", "gentle", "gilded", "golden", "hardy", "hazel", "keen", "light", "lively",
    "lucid", "mellow", "merry", "misty", "neat", "nimble", "placid", "plucky", "prime", "quick",
    "rapid", "sharp", "silent", "sleek", "smooth", "steady", "swift", "warm",
];

pub const ANIMALS: &[&str] = &[
    "badger", "bear", "beaver", "bison", "crane", "condor", "coyote", "crow", "deer", "dingo",
    "eagle", "egret", "falcon", "ferret", "finch", "fox", "gecko", "hare", "hawk", "heron",
    "ibis", "jackal", "jay", "kestrel", "koala", "lemur", "lion", "lynx", "marmot", "marten",
    "mole", "moose", "osprey", "otter", "owl", "panda", "puffin", "rabbit", "raven", "robin",
    "seal", "shrew", "stoat", "swan", "tiger", "vole", "weasel", "wolf",
];

/// Draws before giving up. The pool has over two thousand combinations, so
/// hitting this means the taken set is enormous or something is wrong.
const MAX_DRAWS: usize = 16;

#[derive(Debug, thiserror::Error)]
#[error("could not find an unused adjective-animal name after {0} draws — pass an explicit name")]
pub struct PoolExhausted(pub usize);

/// Next sequential worktree id: one past the current maximum, starting at 1.
pub fn next_id(existing: &[ScannedWorktree]) -> u32 {
    existing
        .iter()
        .map(|w| w.info.id)
        .max()
        .map_or(1, |max| max + 1)
}

/// Draw a random adjective-animal pair not present in `taken`.
pub fn generate_agent_id<R: Rng + ?Sized>(
    taken: &HashSet<String>,
    rng: &mut R,
) -> Result<String, PoolExhausted> {
    for _ in 0..MAX_DRAWS {
        let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("swift");
        let animal = ANIMALS.choose(rng).copied().unwrap_or("fox");
        let candidate = format!("{adjective}-{animal}");
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
    }
    Err(PoolExhausted(MAX_DRAWS))
}
