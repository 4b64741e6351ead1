use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use super::distributor::{DistributorKind, Placement};
use super::{AppError, Processor, is_identifier};

/// Highest port number the runtime hands out endpoints for.
pub const MAX_PORT: u16 = 255;

/// A numbered communication endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Port(u16);

impl Port {
    pub fn new(number: u32) -> Result<Self, AppError> {
        if number > MAX_PORT as u32 {
            return Err(AppError::InvalidPort(number));
        }
        Ok(Self(number as u16))
    }

    pub fn number(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port {}", self.0)
    }
}

/// Describes a schedulable unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Thread {
    pub label: String,
    /// Name the runtime resolves to the code that runs this thread
    pub entry_point: String,
    pub port: Port,
}

impl Thread {
    pub fn new(label: impl Into<String>, entry_point: impl Into<String>, port: Port) -> Self {
        Self {
            label: label.into(),
            entry_point: entry_point.into(),
            port,
        }
    }
}

/// Named binding of a processor to an ordered list of threads.
///
/// Construction checks everything that can be checked locally: the name is an
/// identifier, thread labels and ports are unique, and entry points are
/// identifiers. Uniqueness of the name itself is the job of
/// [`MappingRegistry`](super::MappingRegistry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mapping {
    name: String,
    processor: Processor,
    threads: Vec<Thread>,
    distributor: Option<DistributorKind>,
}

impl Mapping {
    pub fn new(
        name: impl Into<String>,
        processor: Processor,
        threads: Vec<Thread>,
    ) -> Result<Self, AppError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(AppError::InvalidName(name));
        }

        let mut labels = HashSet::new();
        let mut ports = HashSet::new();
        for thread in &threads {
            if thread.label.trim().is_empty() {
                return Err(AppError::InvalidThread("empty label".to_string()));
            }
            if !is_identifier(&thread.entry_point) {
                return Err(AppError::InvalidThread(format!(
                    "thread '{}' has invalid entry point '{}'",
                    thread.label, thread.entry_point
                )));
            }
            if !labels.insert(thread.label.as_str()) {
                return Err(AppError::DuplicateThread(thread.label.clone()));
            }
            if !ports.insert(thread.port) {
                return Err(AppError::DuplicatePort(thread.port.number()));
            }
        }

        tracing::debug!(
            "Declared mapping '{}' on {} with {} thread(s)",
            name,
            processor.model,
            threads.len()
        );

        Ok(Self {
            name,
            processor,
            threads,
            distributor: None,
        })
    }

    pub fn with_distributor(mut self, distributor: DistributorKind) -> Self {
        self.distributor = Some(distributor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn processor(&self) -> &Processor {
        &self.processor
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn thread(&self, label: &str) -> Option<&Thread> {
        self.threads.iter().find(|t| t.label == label)
    }

    pub fn distributor(&self) -> DistributorKind {
        self.distributor.unwrap_or_default()
    }

    /// Assign every thread to a core using the mapping's distributor.
    pub fn placement(&self) -> Result<Placement, AppError> {
        self.distributor()
            .distribute(&self.processor, &self.threads)
    }
}
