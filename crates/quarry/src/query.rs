use crate::mapper::{Mapper, MapperDef, MapperHooks};

use quarry_core::driver::Command;

use std::sync::Arc;

/// One discovered query definition: its raw command plus the mappers bound to
/// it. Owned by its datasource for the process lifetime.
#[derive(Debug)]
pub struct QuerySetting {
    pub name: String,
    pub raw_query: Command,
    pub mappers: Vec<Arc<Mapper>>,
}

impl QuerySetting {
    /// Builds the setting and wires each mapper's weak back-reference.
    /// An empty definition list produces one default mapper.
    pub(crate) fn build(
        name: String,
        raw_query: Command,
        defs: Vec<MapperDef>,
        default_connection: &str,
        hooks_for: &dyn Fn(&str) -> MapperHooks,
    ) -> Arc<Self> {
        let defs = if defs.is_empty() {
            vec![MapperDef::default()]
        } else {
            defs
        };

        Arc::new_cyclic(|weak| {
            let mappers = defs
                .into_iter()
                .enumerate()
                .map(|(index, def)| {
                    let mapper_name = def
                        .name
                        .unwrap_or_else(|| format!("{name}[{index}]"));
                    Arc::new(Mapper {
                        connection_setting: def
                            .connection
                            .unwrap_or_else(|| default_connection.to_string()),
                        transactional: def.transactional,
                        methods: def.methods,
                        parameter_descriptors: def.parameters,
                        query: weak.clone(),
                        hooks: hooks_for(&mapper_name),
                        name: mapper_name,
                    })
                })
                .collect();

            QuerySetting {
                name,
                raw_query,
                mappers,
            }
        })
    }

    /// First mapper answering the given method, if any.
    pub fn mapper_for(&self, method: &str) -> Option<&Arc<Mapper>> {
        self.mappers.iter().find(|m| m.handles_method(method))
    }
}
