use super::{AppError, Mapping};

/// Holds every mapping declared by the application, in registration order.
#[derive(Debug, Default)]
pub struct MappingRegistry {
    mappings: Vec<Mapping>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mapping: Mapping) -> Result<&Mapping, AppError> {
        if self.get(mapping.name()).is_some() {
            tracing::warn!("Rejecting duplicate mapping '{}'", mapping.name());
            return Err(AppError::DuplicateMapping(mapping.name().to_string()));
        }
        tracing::info!("Registered mapping '{}'", mapping.name());
        self.mappings.push(mapping);
        let index = self.mappings.len() - 1;
        Ok(&self.mappings[index])
    }

    pub fn get(&self, name: &str) -> Option<&Mapping> {
        self.mappings.iter().find(|m| m.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Processor;

    fn mapping(name: &str) -> Mapping {
        Mapping::new(name, Processor::p8x32a(), vec![]).unwrap()
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = MappingRegistry::new();
        registry.register(mapping("first")).unwrap();
        registry.register(mapping("second")).unwrap();
        assert_eq!(
            registry.register(mapping("first")).unwrap_err(),
            AppError::DuplicateMapping("first".to_string())
        );
        assert_eq!(registry.len(), 2);
        let names: Vec<_> = registry.iter().map(|m| m.name()).collect();
        assert_eq!(names, ["first", "second"]);
    }
}
