//! Line-oriented command scripts.
//!
//! The tree's test corpus is expressed as scripts of the form
//!
//! ```text
//! insert <key> <value>
//! delete <key>
//! ```
//!
//! with whitespace-separated tokens. Blank and malformed lines are skipped
//! with a diagnostic; an `insert` of a present key or a `delete` of an
//! absent one is rejected for that line and execution continues.

use std::fmt;
use std::str::FromStr;

use banyan_common::{BanyanError, Result};

use crate::store::NodeStore;
use crate::tree::BPlusTree;

/// One script command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command<K, P> {
    Insert(K, P),
    Delete(K),
}

/// Outcome counts of a script run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptReport {
    /// Commands that changed the tree.
    pub applied: usize,
    /// Commands rejected as invalid insertions or deletions.
    pub rejected: usize,
    /// Blank or malformed lines.
    pub skipped: usize,
}

/// Parses one script line; `None` for blank or malformed input.
///
/// Tokens beyond those a command consumes are ignored, so lines may carry
/// trailing commentary.
pub fn parse_line<K: FromStr, P: FromStr>(line: &str) -> Option<Command<K, P>> {
    let mut tokens = line.split_whitespace();
    match tokens.next()? {
        "insert" => {
            let key = tokens.next()?.parse().ok()?;
            let value = tokens.next()?.parse().ok()?;
            Some(Command::Insert(key, value))
        }
        "delete" => {
            let key = tokens.next()?.parse().ok()?;
            Some(Command::Delete(key))
        }
        _ => None,
    }
}

/// Runs a script against a tree, line by line.
///
/// Invalid insertions and deletions are logged and counted but do not stop
/// the run; every other error aborts it.
pub fn run_script<K, P, S>(
    tree: &mut BPlusTree<K, P, S>,
    script: &str,
) -> Result<ScriptReport>
where
    K: Ord + Clone + fmt::Debug + FromStr,
    P: Clone + FromStr,
    S: NodeStore<K, P>,
{
    let mut report = ScriptReport::default();
    for (number, line) in script.lines().enumerate() {
        let Some(command) = parse_line::<K, P>(line) else {
            if !line.trim().is_empty() {
                tracing::warn!(line = number + 1, text = line, "ignoring malformed line");
            }
            report.skipped += 1;
            continue;
        };
        let outcome = match command {
            Command::Insert(key, value) => tree.insert(key, value),
            Command::Delete(key) => tree.delete(&key),
        };
        match outcome {
            Ok(()) => report.applied += 1,
            Err(err @ (BanyanError::InvalidInsertion { .. } | BanyanError::InvalidDeletion { .. })) => {
                tracing::debug!(line = number + 1, %err, "command rejected");
                report.rejected += 1;
            }
            Err(err) => return Err(err),
        }
    }
    Ok(report)
}
