use crate::config::Config;
use crate::types::{ModelType, ProviderDescriptor};
use std::collections::HashMap;

/// Read-only store of provider descriptors, keyed by name. No mutation API
/// during normal operation: status changes are applied by atomic
/// replacement of the affected descriptor, which the registry exposes via
/// `replace`.
#[derive(Debug)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderDescriptor>,
}

impl ProviderRegistry {
    pub fn new(config: &Config) -> Self {
        let providers = config
            .providers
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone().into_descriptor(name.clone())))
            .collect();
        Self { providers }
    }

    pub fn from_descriptors(descriptors: Vec<ProviderDescriptor>) -> Self {
        let providers = descriptors.into_iter().map(|d| (d.name.clone(), d)).collect();
        Self { providers }
    }

    pub fn get(&self, name: &str) -> Option<&ProviderDescriptor> {
        self.providers.get(name)
    }

    pub fn list(&self) -> Vec<&ProviderDescriptor> {
        self.providers.values().collect()
    }

    pub fn list_by_type(&self, t: ModelType) -> Vec<&ProviderDescriptor> {
        self.providers.values().filter(|d| d.supports(t)).collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Atomically swap in a new descriptor for a provider, as would happen
    /// on a health-event-driven status change.
    pub fn replace(&mut self, descriptor: ProviderDescriptor) {
        self.providers.insert(descriptor.name.clone(), descriptor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderStatus;

    fn descriptor(name: &str, types: Vec<ModelType>) -> ProviderDescriptor {
        ProviderDescriptor {
            name: name.to_string(),
            status: ProviderStatus::Online,
            supported_types: types,
            capabilities: vec!["chat".to_string()],
            max_concurrent: 4,
            base_cost: 0.01,
            max_cost: 1.0,
            cost_efficiency: 0.8,
        }
    }

    #[test]
    fn list_by_type_filters_correctly() {
        let registry = ProviderRegistry::from_descriptors(vec![
            descriptor("local-a", vec![ModelType::Local]),
            descriptor("remote-a", vec![ModelType::Remote]),
        ]);

        let local = registry.list_by_type(ModelType::Local);
        assert_eq!(local.len(), 1);
        assert_eq!(local[0].name, "local-a");
    }

    #[test]
    fn replace_is_atomic_swap() {
        let mut registry = ProviderRegistry::from_descriptors(vec![descriptor(
            "p",
            vec![ModelType::Local],
        )]);
        let mut updated = descriptor("p", vec![ModelType::Local]);
        updated.status = ProviderStatus::Offline;
        registry.replace(updated);

        assert_eq!(registry.get("p").unwrap().status, ProviderStatus::Offline);
    }
}
