//! App Schema Registry
//!
//! [`AppSchema::compile`] turns the root container schema into the compiled,
//! read-only description of the whole tree that every session shares:
//!
//! 1. Assign every container instance its dotted path from the root.
//! 2. Rebase container-relative field references in computed Vars.
//! 3. Check that every referenced field exists somewhere in the tree and is
//!    read as the type it is declared with.
//! 4. Build the field dependency graph and its topological order, rejecting
//!    cycles.
//!
//! The process-wide registry holds one compiled schema. It is installed once
//! at startup and treated as read-only afterwards.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;

use crate::delta::Delta;
use crate::error::StateError;
use crate::event::Handler;
use crate::graph::{Node, UpdateScheduler};
use crate::var::{FieldKey, Var};

use super::schema::{FieldDecl, StateSchema};
use super::storage::ClientStorageManifest;
use super::tree::StateTree;

/// One container instance in the compiled tree.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    path: String,
    parent: Option<String>,
    schema: Arc<StateSchema>,
}

impl ContainerInfo {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of the parent container. `None` for the root.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }
}

/// The compiled description of a state tree.
#[derive(Debug)]
pub struct AppSchema {
    root: String,
    /// Containers in pre-order, keyed by path.
    containers: IndexMap<String, ContainerInfo>,
    /// Computed Vars with absolute field references.
    computed: BTreeMap<FieldKey, Var>,
    graph: UpdateScheduler,
    order: Vec<FieldKey>,
}

impl AppSchema {
    /// Compile the tree rooted at `root`. The root's path is its name.
    pub fn compile(root: Arc<StateSchema>) -> Result<Arc<Self>, StateError> {
        let mut containers = IndexMap::new();
        collect_containers(&root, root.name().to_string(), None, &mut containers);

        let mut graph = UpdateScheduler::new();
        let mut computed = BTreeMap::new();
        for (path, info) in &containers {
            for decl in info.schema.fields() {
                graph.add_node(Node::source(FieldKey::new(path.as_str(), decl.name())));
            }
            for (name, var) in info.schema.computed_fields() {
                let key = FieldKey::new(path.as_str(), name);
                graph.add_node(Node::computed(key.clone()));
                computed.insert(key, var.rebased(path));
            }
        }

        for (key, var) in &computed {
            for dependency in var.dependencies() {
                if !graph.contains(dependency) {
                    return Err(StateError::UnknownFieldReference {
                        computed: key.clone(),
                        reference: dependency.clone(),
                    });
                }
                graph.add_edge(dependency, key);
            }
            check_reference_types(key, var, &containers, &computed)?;
        }

        let order = graph
            .topological_order()
            .map_err(|cycle| StateError::CyclicComputedDependency { cycle })?;

        tracing::debug!(
            root = %root.name(),
            containers = containers.len(),
            fields = graph.node_count(),
            computed = order.len(),
            "compiled app schema"
        );

        Ok(Arc::new(Self {
            root: root.name().to_string(),
            containers,
            computed,
            graph,
            order,
        }))
    }

    pub fn root_path(&self) -> &str {
        &self.root
    }

    pub fn container(&self, path: &str) -> Option<&ContainerInfo> {
        self.containers.get(path)
    }

    /// Containers in pre-order (parents before children).
    pub fn containers(&self) -> impl Iterator<Item = &ContainerInfo> {
        self.containers.values()
    }

    /// Declaration of a stored field. `None` for computed or unknown fields.
    pub fn field(&self, key: &FieldKey) -> Option<&FieldDecl> {
        self.container(&key.path)?.schema.field(&key.field)
    }

    /// The rebased Var of a computed field.
    pub fn computed(&self, key: &FieldKey) -> Option<&Var> {
        self.computed.get(key)
    }

    pub fn is_computed(&self, key: &FieldKey) -> bool {
        self.computed.contains_key(key)
    }

    /// All computed fields, dependencies first.
    pub fn computed_order(&self) -> &[FieldKey] {
        &self.order
    }

    pub fn computed_count(&self) -> usize {
        self.order.len()
    }

    pub fn graph(&self) -> &UpdateScheduler {
        &self.graph
    }

    /// Backend fields stay on the server.
    pub fn is_backend(&self, key: &FieldKey) -> bool {
        self.field(key).is_some_and(FieldDecl::is_backend)
    }

    /// Resolve `"<container path>.<handler>"` to the container path and handler.
    pub fn resolve_handler<'a>(&'a self, handler_path: &'a str) -> Option<(&'a str, &'a Handler)> {
        let (path, name) = handler_path.rsplit_once('.')?;
        let handler = self.container(path)?.schema.handler(name)?;
        Some((path, handler))
    }

    /// Full initial state of a fresh tree, with computed fields evaluated.
    ///
    /// Used to hydrate the client and to emit the initial context file.
    pub fn initial_state(self: &Arc<Self>) -> Result<Delta, StateError> {
        StateTree::new(Arc::clone(self))?.snapshot()
    }

    /// Client storage bindings of every container, keyed by
    /// `"<container path>.<field>"`.
    ///
    /// Fields copied from a base schema are listed under every container that
    /// copies them, since each container instance stores its own value.
    pub fn client_storage(&self) -> ClientStorageManifest {
        let mut manifest = ClientStorageManifest::default();
        for info in self.containers.values() {
            for decl in info.schema.fields() {
                if let Some(storage) = decl.storage() {
                    manifest.insert(format!("{}.{}", info.path, decl.name()), storage);
                }
            }
        }
        manifest
    }
}

/// Every field a computed Var reads must be read as its declared type, or a
/// less specific one with `Unknown` parts.
fn check_reference_types(
    computed_key: &FieldKey,
    var: &Var,
    containers: &IndexMap<String, ContainerInfo>,
    computed: &BTreeMap<FieldKey, Var>,
) -> Result<(), StateError> {
    for (reference, referenced) in var.references() {
        let declared = match computed.get(reference) {
            Some(var) => var.var_type(),
            None => match containers
                .get(&reference.path)
                .and_then(|info| info.schema.field(&reference.field))
            {
                Some(decl) => decl.var_type(),
                None => continue,
            },
        };
        if !declared.refines(referenced) && !referenced.refines(declared) {
            return Err(StateError::ReferenceTypeMismatch {
                computed: computed_key.clone(),
                reference: reference.clone(),
                referenced: referenced.clone(),
                declared: declared.clone(),
            });
        }
    }
    Ok(())
}

fn collect_containers(
    schema: &Arc<StateSchema>,
    path: String,
    parent: Option<String>,
    out: &mut IndexMap<String, ContainerInfo>,
) {
    out.insert(
        path.clone(),
        ContainerInfo {
            path: path.clone(),
            parent,
            schema: Arc::clone(schema),
        },
    );
    for (name, child) in schema.children() {
        collect_containers(child, format!("{path}.{name}"), Some(path.clone()), out);
    }
}

// Process-wide registry, populated once at startup.
static REGISTRY: OnceLock<Arc<AppSchema>> = OnceLock::new();

/// Install the process-wide app schema. Fails if one is already installed.
pub fn install(schema: Arc<AppSchema>) -> Result<Arc<AppSchema>, StateError> {
    REGISTRY
        .set(Arc::clone(&schema))
        .map_err(|_| StateError::AlreadyInstalled)?;
    tracing::info!(root = %schema.root_path(), "installed app schema");
    Ok(schema)
}

/// The process-wide app schema, if installed.
pub fn global() -> Option<Arc<AppSchema>> {
    REGISTRY.get().cloned()
}
