use std::sync::Arc;

use indexmap::IndexMap;

use crate::engine::Flow;
use crate::errors::EngineError;

/// Flows disponibles, indexados por nombre (orden de registro preservado).
pub struct FlowRegistry<C> {
    flows: IndexMap<String, Arc<dyn Flow<C>>>,
}

impl<C> Default for FlowRegistry<C> {
    fn default() -> Self {
        Self { flows: IndexMap::new() }
    }
}

impl<C> FlowRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, flow: F) -> Result<(), EngineError>
        where F: Flow<C> + 'static
    {
        self.register_arc(Arc::new(flow))
    }

    pub fn register_arc(&mut self, flow: Arc<dyn Flow<C>>) -> Result<(), EngineError> {
        let name = flow.name().to_string();
        if self.flows.contains_key(&name) {
            return Err(EngineError::DuplicateFlow(name));
        }
        self.flows.insert(name, flow);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Flow<C>>> {
        self.flows.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.flows.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::flow_fn;
    use crate::ledger::MemoryConn;
    use serde_json::json;

    #[test]
    fn duplicate_flow_names_are_rejected() {
        let mut reg = FlowRegistry::<MemoryConn>::new();
        reg.register(flow_fn("a", |_ctx, _input| Ok(json!(1)))).unwrap();
        reg.register(flow_fn("b", |_ctx, _input| Ok(json!(2)))).unwrap();
        let err = reg.register(flow_fn("a", |_ctx, _input| Ok(json!(3)))).unwrap_err();
        assert_eq!(err, EngineError::DuplicateFlow("a".into()));
        assert_eq!(reg.names().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(reg.get("c").is_none());
    }
}
