//! Application model: boards, processors, threads, ports and the mappings
//! that bind them together.
//!
//! A [`Mapping`] is the unit the runtime executes. It names one processor and
//! an ordered list of [`Thread`] descriptors; each thread points at an entry
//! point by name and owns one [`Port`] through which other code talks to it.
//!
//! ```
//! use vegimeter::app::{Board, Mapping, Port, Thread};
//!
//! let board = Board::new();
//! let mapping = Mapping::new(
//!     "demo",
//!     board.get_processor(),
//!     vec![Thread::new("WORKER", "engine_runner", Port::new(3).unwrap())],
//! )
//! .unwrap();
//! assert_eq!(mapping.threads().len(), 1);
//! ```

pub mod board;
pub mod distributor;
pub mod mapping;
pub mod registry;

pub use board::{Board, Processor};
pub use distributor::{
    DistributorKind, DummyThreadDistributor, Placement, RoundRobinThreadDistributor,
    ThreadDistributor,
};
pub use mapping::{MAX_PORT, Mapping, Port, Thread};
pub use registry::MappingRegistry;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("invalid mapping name '{0}': must be a non-empty identifier")]
    InvalidName(String),
    #[error("invalid port {0}: must be at most {max}", max = MAX_PORT)]
    InvalidPort(u32),
    #[error("invalid thread: {0}")]
    InvalidThread(String),
    #[error("thread '{0}' declared more than once")]
    DuplicateThread(String),
    #[error("port {0} is assigned to more than one thread")]
    DuplicatePort(u16),
    #[error("a mapping named '{0}' is already registered")]
    DuplicateMapping(String),
    #[error("processor '{0}' has no cores to place threads on")]
    NoCores(String),
    #[error("unknown board model '{0}'")]
    UnknownBoard(String),
}

/// Identifiers follow the usual `[A-Za-z_][A-Za-z0-9_]*` shape.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("vegimeter2"));
        assert!(is_identifier("_x"));
        assert!(is_identifier("ENGINE"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("has space"));
        assert!(!is_identifier("dash-ed"));
    }
}
