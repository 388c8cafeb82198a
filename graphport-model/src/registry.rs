use crate::error::{ModelError, ModelResult};
use crate::schema::{CompositionPolicy, FieldDef, FieldKind, LinkTarget, Requirement, TypeSchema};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// A business type that can take part in export/import.
///
/// Implementors describe themselves once; [`SchemaRegistryBuilder::register`]
/// turns the description into a capability table entry.
pub trait Exportable {
    /// Type tag written into documents (`__type__`).
    const ENTITY_TYPE: &'static str;

    /// Fields, key fields and export capability of the type.
    fn schema() -> TypeSchema;
}

/// Per-type capabilities, computed when the registry is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Records of this type may be exported as link targets.
    pub exportable: bool,
    /// The type declares key fields and may be a link target.
    pub keyed: bool,
    /// Policy used when this type is the member type of a composition.
    pub composition_policy: CompositionPolicy,
}

#[derive(Debug, Clone)]
struct RegisteredType {
    schema: TypeSchema,
    capabilities: Capabilities,
}

/// Collects type schemas before validation.
#[derive(Debug, Default)]
pub struct SchemaRegistryBuilder {
    schemas: Vec<TypeSchema>,
}

impl SchemaRegistryBuilder {
    /// Adds a schema.
    pub fn add(mut self, schema: TypeSchema) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Adds the schema of an [`Exportable`] type.
    pub fn register<T: Exportable>(self) -> Self {
        let mut schema = T::schema();
        schema.entity_type = T::ENTITY_TYPE.to_string();
        self.add(schema)
    }

    /// Validates link targets and key paths, then freezes the registry.
    pub fn build(self) -> ModelResult<SchemaRegistry> {
        let mut types = BTreeMap::new();
        for mut schema in self.schemas {
            schema.fields.sort_by(|a, b| a.name.cmp(&b.name));
            let capabilities = Capabilities {
                exportable: schema.exportable,
                keyed: schema.has_key(),
                composition_policy: if schema.has_key() {
                    CompositionPolicy::ReconcileByKey
                } else {
                    CompositionPolicy::ForceRecreate
                },
            };
            let name = schema.entity_type.clone();
            if types
                .insert(name.clone(), RegisteredType { schema, capabilities })
                .is_some()
            {
                return Err(ModelError::DuplicateType(name));
            }
        }

        let registry = SchemaRegistry { types };
        registry.validate_targets()?;
        registry.validate_key_paths()?;
        Ok(registry)
    }
}

/// Capability table of every registered type.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    types: BTreeMap<String, RegisteredType>,
}

impl SchemaRegistry {
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::default()
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.types.contains_key(entity_type)
    }

    /// Registered type names, sorted.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Schema of a type. Fields are sorted by name.
    pub fn schema(&self, entity_type: &str) -> ModelResult<&TypeSchema> {
        self.entry(entity_type).map(|t| &t.schema)
    }

    pub fn capabilities(&self, entity_type: &str) -> ModelResult<Capabilities> {
        self.entry(entity_type).map(|t| t.capabilities)
    }

    /// Declared field of a type.
    pub fn field(&self, entity_type: &str, field: &str) -> ModelResult<&FieldDef> {
        self.schema(entity_type)?
            .field_def(field)
            .ok_or_else(|| ModelError::UnknownField {
                entity_type: entity_type.to_string(),
                field: field.to_string(),
            })
    }

    /// Key fields of a type; fails for types that cannot be link targets.
    pub fn key_fields(&self, entity_type: &str) -> ModelResult<&[String]> {
        let schema = self.schema(entity_type)?;
        if schema.key_fields.is_empty() {
            return Err(ModelError::MissingKeyDefinition(entity_type.to_string()));
        }
        Ok(&schema.key_fields)
    }

    fn entry(&self, entity_type: &str) -> ModelResult<&RegisteredType> {
        self.types
            .get(entity_type)
            .ok_or_else(|| ModelError::UnknownType(entity_type.to_string()))
    }

    fn validate_targets(&self) -> ModelResult<()> {
        for registered in self.types.values() {
            for field in &registered.schema.fields {
                for target in field.kind.targets() {
                    if !self.contains(target) {
                        return Err(ModelError::UnknownType(target.clone()));
                    }
                }
                if let Requirement::RequiredWhen { field: cond, .. } = &field.requirement {
                    if registered.schema.field_def(cond).is_none() {
                        return Err(ModelError::UnknownField {
                            entity_type: registered.schema.entity_type.clone(),
                            field: cond.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks every key path and that key definitions do not depend on
    /// each other in a loop (key computation would never terminate).
    fn validate_key_paths(&self) -> ModelResult<()> {
        let mut depends_on: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

        for (name, registered) in &self.types {
            let deps = depends_on.entry(name.as_str()).or_default();
            for path in &registered.schema.key_fields {
                let mut current = name.as_str();
                let segments: Vec<&str> = path.split('.').collect();
                for (i, segment) in segments.iter().enumerate() {
                    let last = i + 1 == segments.len();
                    let field = self.field(current, segment)?;
                    let invalid = |reason: &str| ModelError::InvalidKeyPath {
                        entity_type: name.clone(),
                        path: path.clone(),
                        reason: reason.to_string(),
                    };
                    match (&field.kind, last) {
                        (FieldKind::Scalar, true) => {}
                        (FieldKind::Scalar, false) => {
                            return Err(invalid("path continues past a scalar"));
                        }
                        (FieldKind::SingleLink { target }, _) => match target {
                            LinkTarget::Type(t) => {
                                // Only a trailing link embeds the target's own key.
                                if last {
                                    deps.insert(t.as_str());
                                }
                                current = t.as_str();
                            }
                            LinkTarget::Polymorphic(targets) if last => {
                                deps.extend(targets.iter().map(String::as_str));
                            }
                            LinkTarget::Polymorphic(_) => {
                                return Err(invalid("path traverses a polymorphic reference"));
                            }
                        },
                        _ => return Err(invalid("multi-links cannot be key fields")),
                    }
                }
            }
        }

        // Kahn's algorithm: types whose key depends on nothing unresolved first.
        let mut remaining: BTreeMap<&str, usize> =
            depends_on.iter().map(|(name, deps)| (*name, deps.len())).collect();
        let mut ready: VecDeque<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        while let Some(done) = ready.pop_front() {
            remaining.remove(done);
            for (name, deps) in &depends_on {
                if deps.contains(done) {
                    if let Some(count) = remaining.get_mut(name) {
                        *count -= 1;
                        if *count == 0 {
                            ready.push_back(*name);
                        }
                    }
                }
            }
        }

        match remaining.keys().next() {
            Some(name) => Err(ModelError::KeyCycle((*name).to_string())),
            None => Ok(()),
        }
    }
}
