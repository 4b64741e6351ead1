//! Thread distribution: deciding which core runs which thread.

use serde::{Deserialize, Serialize};

use super::{AppError, Processor, Thread};

/// Result of distributing a mapping's threads, in thread order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Placement {
    assignments: Vec<(String, u8)>,
}

impl Placement {
    pub fn core_of(&self, label: &str) -> Option<u8> {
        self.assignments
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, core)| *core)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u8)> {
        self.assignments.iter().map(|(l, c)| (l.as_str(), *c))
    }

    /// Threads placed on `core`, in thread order.
    pub fn threads_on(&self, core: u8) -> Vec<&str> {
        self.iter()
            .filter(|(_, c)| *c == core)
            .map(|(l, _)| l)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

pub trait ThreadDistributor: Send + Sync {
    fn distribute(&self, processor: &Processor, threads: &[Thread]) -> Result<Placement, AppError>;
}

/// Puts thread `i` on core `i % cores`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinThreadDistributor;

impl ThreadDistributor for RoundRobinThreadDistributor {
    fn distribute(&self, processor: &Processor, threads: &[Thread]) -> Result<Placement, AppError> {
        if processor.cores == 0 {
            return Err(AppError::NoCores(processor.model.clone()));
        }
        let assignments = threads
            .iter()
            .enumerate()
            .map(|(i, t)| (t.label.clone(), (i % processor.cores as usize) as u8))
            .collect();
        Ok(Placement { assignments })
    }
}

/// Puts every thread on the first core.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyThreadDistributor;

impl ThreadDistributor for DummyThreadDistributor {
    fn distribute(&self, processor: &Processor, threads: &[Thread]) -> Result<Placement, AppError> {
        if processor.cores == 0 {
            return Err(AppError::NoCores(processor.model.clone()));
        }
        let assignments = threads.iter().map(|t| (t.label.clone(), 0)).collect();
        Ok(Placement { assignments })
    }
}

/// Distributor selection as it appears in a mapping or a config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributorKind {
    #[default]
    RoundRobin,
    Dummy,
}

impl DistributorKind {
    pub fn distribute(&self, processor: &Processor, threads: &[Thread]) -> Result<Placement, AppError> {
        match self {
            DistributorKind::RoundRobin => RoundRobinThreadDistributor.distribute(processor, threads),
            DistributorKind::Dummy => DummyThreadDistributor.distribute(processor, threads),
        }
    }
}
