//! Container Schemas
//!
//! A [`StateSchema`] is the declaration of one container type: its typed
//! fields, computed fields, event handlers and named child containers.
//! Schemas are assembled once at startup with [`StateSchemaBuilder`] and are
//! immutable afterwards.
//!
//! # Composition
//!
//! There is no runtime inheritance. A schema may copy the declarations of any
//! number of base schemas with [`StateSchemaBuilder::extends`]; the result is
//! a flat set of names. Fields, computed fields, handlers and children share a
//! single namespace per container, and declaring a name twice (including a
//! name taken by a base) fails with [`StateError::SchemaConflict`].

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::error::StateError;
use crate::event::Handler;
use crate::value::Value;
use crate::var::{is_identifier, Var, VarType};

use super::storage::ClientStorage;

/// Declaration of a stored field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    name: String,
    ty: VarType,
    default: Value,
    backend: bool,
    storage: Option<ClientStorage>,
}

impl FieldDecl {
    /// Declare a field initialized to the zero value of its type.
    pub fn new(name: impl Into<String>, ty: VarType) -> Self {
        let default = ty.zero_value();
        Self {
            name: name.into(),
            ty,
            default,
            backend: false,
            storage: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// Keep the field on the server. It is never sent to the client.
    pub fn backend(mut self) -> Self {
        self.backend = true;
        self
    }

    /// Persist the field in client storage.
    pub fn stored(mut self, storage: ClientStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var_type(&self) -> &VarType {
        &self.ty
    }

    pub fn default_value(&self) -> &Value {
        &self.default
    }

    pub fn is_backend(&self) -> bool {
        self.backend
    }

    pub fn storage(&self) -> Option<&ClientStorage> {
        self.storage.as_ref()
    }
}

/// The declaration of one container type.
pub struct StateSchema {
    name: String,
    fields: IndexMap<String, FieldDecl>,
    computed: IndexMap<String, Var>,
    handlers: IndexMap<String, Handler>,
    children: IndexMap<String, Arc<StateSchema>>,
    /// Names copied from base schemas rather than declared here.
    inherited: IndexSet<String>,
}

impl StateSchema {
    /// Start declaring a container type.
    pub fn builder(name: impl Into<String>) -> Result<StateSchemaBuilder, StateError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(StateError::InvalidName { name });
        }
        Ok(StateSchemaBuilder {
            schema: StateSchema {
                name,
                fields: IndexMap::new(),
                computed: IndexMap::new(),
                handlers: IndexMap::new(),
                children: IndexMap::new(),
                inherited: IndexSet::new(),
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.get(name)
    }

    /// Stored fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.fields.values()
    }

    pub fn computed(&self, name: &str) -> Option<&Var> {
        self.computed.get(name)
    }

    /// Computed fields in declaration order.
    pub fn computed_fields(&self) -> impl Iterator<Item = (&str, &Var)> {
        self.computed.iter().map(|(name, var)| (name.as_str(), var))
    }

    pub fn handler(&self, name: &str) -> Option<&Handler> {
        self.handlers.get(name)
    }

    pub fn handler_names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn child(&self, name: &str) -> Option<&Arc<StateSchema>> {
        self.children.get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = (&str, &Arc<StateSchema>)> {
        self.children.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    /// True when `name` was copied from a base schema.
    pub fn is_inherited(&self, name: &str) -> bool {
        self.inherited.contains(name)
    }

    /// True when `name` is a stored or computed field of this container.
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.computed.contains_key(name)
    }

    fn is_declared(&self, name: &str) -> bool {
        self.has_field(name) || self.handlers.contains_key(name) || self.children.contains_key(name)
    }
}

impl fmt::Debug for StateSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSchema")
            .field("name", &self.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("computed", &self.computed.keys().collect::<Vec<_>>())
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("children", &self.children.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Builder for [`StateSchema`]. Every step validates the new declaration.
#[derive(Debug)]
pub struct StateSchemaBuilder {
    schema: StateSchema,
}

impl StateSchemaBuilder {
    /// Copy every declaration of `base` into this schema.
    pub fn extends(mut self, base: &StateSchema) -> Result<Self, StateError> {
        for (name, decl) in &base.fields {
            self.claim(name)?;
            self.schema.fields.insert(name.clone(), decl.clone());
            self.schema.inherited.insert(name.clone());
        }
        for (name, var) in &base.computed {
            self.claim(name)?;
            self.schema.computed.insert(name.clone(), var.clone());
            self.schema.inherited.insert(name.clone());
        }
        for (name, handler) in &base.handlers {
            self.claim(name)?;
            self.schema.handlers.insert(name.clone(), handler.clone());
            self.schema.inherited.insert(name.clone());
        }
        for (name, child) in &base.children {
            self.claim(name)?;
            self.schema.children.insert(name.clone(), Arc::clone(child));
            self.schema.inherited.insert(name.clone());
        }
        Ok(self)
    }

    /// Declare a stored field with a default value.
    pub fn field(
        self,
        name: impl Into<String>,
        ty: VarType,
        default: impl Into<Value>,
    ) -> Result<Self, StateError> {
        self.declare(FieldDecl::new(name, ty).with_default(default))
    }

    /// Declare a stored field from a full declaration.
    pub fn declare(mut self, mut decl: FieldDecl) -> Result<Self, StateError> {
        self.claim(&decl.name)?;
        let default = std::mem::take(&mut decl.default);
        let found = default.kind();
        decl.default = decl
            .ty
            .coerce(default)
            .ok_or_else(|| StateError::FieldTypeMismatch {
                container: self.schema.name.clone(),
                field: decl.name.clone(),
                expected: decl.ty.clone(),
                found: found.to_string(),
            })?;
        self.schema.fields.insert(decl.name.clone(), decl);
        Ok(self)
    }

    /// Declare a computed field defined by a Var.
    ///
    /// Fields of this container are referenced with [`Var::field`]; other
    /// containers with [`Var::state_field`]. References are checked when the
    /// tree is compiled.
    pub fn computed(mut self, name: impl Into<String>, var: Var) -> Result<Self, StateError> {
        let name = name.into();
        self.claim(&name)?;
        self.schema.computed.insert(name, var);
        Ok(self)
    }

    pub fn handler(mut self, name: impl Into<String>, handler: Handler) -> Result<Self, StateError> {
        let name = name.into();
        self.claim(&name)?;
        self.schema.handlers.insert(name, handler);
        Ok(self)
    }

    /// Nest a child container under `name`.
    pub fn child(
        mut self,
        name: impl Into<String>,
        schema: Arc<StateSchema>,
    ) -> Result<Self, StateError> {
        let name = name.into();
        self.claim(&name)?;
        self.schema.children.insert(name, schema);
        Ok(self)
    }

    pub fn build(self) -> Arc<StateSchema> {
        Arc::new(self.schema)
    }

    fn claim(&self, name: &str) -> Result<(), StateError> {
        if !is_identifier(name) {
            return Err(StateError::InvalidName {
                name: name.to_string(),
            });
        }
        if self.schema.is_declared(name) {
            return Err(StateError::SchemaConflict {
                container: self.schema.name.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Handler {
        Handler::sync(|_, _| Ok(Vec::new()))
    }

    #[test]
    fn builds_flat_schema() {
        let schema = StateSchema::builder("counter")
            .unwrap()
            .field("count", VarType::Int, 0)
            .unwrap()
            .computed("double", Var::field("count", VarType::Int).mul(&Var::literal(2)).unwrap())
            .unwrap()
            .handler("increment", noop())
            .unwrap()
            .build();

        assert_eq!(schema.name(), "counter");
        assert_eq!(schema.field("count").unwrap().default_value(), &Value::Int(0));
        assert!(schema.computed("double").is_some());
        assert!(schema.handler("increment").is_some());
        assert!(schema.has_field("double"));
        assert!(!schema.has_field("increment"));
    }

    #[test]
    fn duplicate_names_conflict() {
        let err = StateSchema::builder("counter")
            .unwrap()
            .field("count", VarType::Int, 0)
            .unwrap()
            .handler("count", noop())
            .unwrap_err();
        assert_eq!(
            err,
            StateError::SchemaConflict {
                container: "counter".into(),
                name: "count".into()
            }
        );
    }

    #[test]
    fn bases_are_flattened() {
        let base = StateSchema::builder("base")
            .unwrap()
            .field("id", VarType::Str, "")
            .unwrap()
            .build();
        let derived = StateSchema::builder("user")
            .unwrap()
            .extends(&base)
            .unwrap()
            .field("name", VarType::Str, "")
            .unwrap()
            .build();

        assert!(derived.field("id").is_some());
        assert!(derived.is_inherited("id"));
        assert!(!derived.is_inherited("name"));

        let err = StateSchema::builder("user")
            .unwrap()
            .extends(&base)
            .unwrap()
            .field("id", VarType::Int, 0)
            .unwrap_err();
        assert!(matches!(err, StateError::SchemaConflict { .. }));
    }

    #[test]
    fn defaults_are_type_checked() {
        let err = StateSchema::builder("s")
            .unwrap()
            .field("count", VarType::Int, "zero")
            .unwrap_err();
        assert!(matches!(err, StateError::FieldTypeMismatch { .. }));

        let schema = StateSchema::builder("s")
            .unwrap()
            .field("ratio", VarType::Float, 1)
            .unwrap()
            .build();
        assert_eq!(schema.field("ratio").unwrap().default_value(), &Value::Float(1.0));
    }

    #[test]
    fn names_must_be_identifiers() {
        assert!(matches!(
            StateSchema::builder("not valid"),
            Err(StateError::InvalidName { .. })
        ));
        let err = StateSchema::builder("s")
            .unwrap()
            .field("a.b", VarType::Int, 0)
            .unwrap_err();
        assert!(matches!(err, StateError::InvalidName { .. }));
    }
}
