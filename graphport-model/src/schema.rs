use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declares a type's fields, functional key and export capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeSchema {
    pub entity_type: String,
    /// Field names (or dotted paths through single links, e.g.
    /// `company.party.name`) forming the functional key.
    #[serde(default)]
    pub key_fields: Vec<String>,
    pub fields: Vec<FieldDef>,
    /// Whether records of this type may be exported as link targets.
    #[serde(default = "default_exportable")]
    pub exportable: bool,
}

fn default_exportable() -> bool {
    true
}

impl TypeSchema {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            key_fields: Vec::new(),
            fields: Vec::new(),
            exportable: true,
        }
    }

    /// Sets the functional key fields.
    pub fn key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Marks the type as not exportable.
    pub fn not_exportable(mut self) -> Self {
        self.exportable = false;
        self
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_key(&self) -> bool {
        !self.key_fields.is_empty()
    }
}

/// One declared field of a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub requirement: Requirement,
    /// Export emits only the target's key, never the full record.
    #[serde(default)]
    pub light: bool,
    /// Field is left out of documents entirely.
    #[serde(default)]
    pub skip_export: bool,
}

impl FieldDef {
    fn with_kind(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            requirement: Requirement::Optional,
            light: false,
            skip_export: false,
        }
    }

    /// Plain value field.
    pub fn scalar(name: impl Into<String>) -> Self {
        Self::with_kind(name, FieldKind::Scalar)
    }

    /// 0..1 link to a record of `target`.
    pub fn link(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::SingleLink {
                target: LinkTarget::Type(target.into()),
            },
        )
    }

    /// 0..1 link to a record of any of `targets`; documents tag it with the type.
    pub fn reference<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_kind(
            name,
            FieldKind::SingleLink {
                target: LinkTarget::Polymorphic(targets.into_iter().map(Into::into).collect()),
            },
        )
    }

    /// Owned members; lifecycle bound to the owner.
    pub fn composition(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::Composition {
                target: target.into(),
            },
        )
    }

    /// Shared references to independently keyed records.
    pub fn association(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            FieldKind::Association {
                target: target.into(),
            },
        )
    }

    pub fn required(mut self) -> Self {
        self.requirement = Requirement::Required;
        self
    }

    /// Required only while scalar `field` equals `equals`.
    pub fn required_when(mut self, field: impl Into<String>, equals: impl Into<Value>) -> Self {
        self.requirement = Requirement::RequiredWhen {
            field: field.into(),
            equals: equals.into(),
        };
        self
    }

    pub fn light(mut self) -> Self {
        self.light = true;
        self
    }

    pub fn skip_export(mut self) -> Self {
        self.skip_export = true;
        self
    }
}

/// Closed classification of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar,
    SingleLink { target: LinkTarget },
    Composition { target: String },
    Association { target: String },
}

impl FieldKind {
    /// Every type this field may point at.
    pub fn targets(&self) -> &[String] {
        match self {
            FieldKind::Scalar => &[],
            FieldKind::SingleLink { target } => target.types(),
            FieldKind::Composition { target } | FieldKind::Association { target } => {
                std::slice::from_ref(target)
            }
        }
    }

    pub fn is_link(&self) -> bool {
        !matches!(self, FieldKind::Scalar)
    }
}

/// Target of a single link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkTarget {
    Type(String),
    Polymorphic(Vec<String>),
}

impl LinkTarget {
    pub fn is_polymorphic(&self) -> bool {
        matches!(self, LinkTarget::Polymorphic(_))
    }

    pub fn accepts(&self, entity_type: &str) -> bool {
        self.types().iter().any(|t| t == entity_type)
    }

    pub fn types(&self) -> &[String] {
        match self {
            LinkTarget::Type(t) => std::slice::from_ref(t),
            LinkTarget::Polymorphic(types) => types,
        }
    }
}

/// Whether a link must be set before its record can be created.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Requirement {
    #[default]
    Optional,
    Required,
    /// Required while the scalar `field` equals `equals`.
    RequiredWhen { field: String, equals: Value },
}

impl Requirement {
    /// Evaluates the requirement against the record's scalar values.
    pub fn is_required<F>(&self, scalar: F) -> bool
    where
        F: Fn(&str) -> Option<Value>,
    {
        match self {
            Requirement::Optional => false,
            Requirement::Required => true,
            Requirement::RequiredWhen { field, equals } => scalar(field).as_ref() == Some(equals),
        }
    }
}

/// Coarse field class returned by [`crate::classify_field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    Scalar,
    SingleLink,
    MultiLink,
}

/// How an import reconciles the members of a composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositionPolicy {
    /// Members have no key: delete all existing, recreate from the document.
    ForceRecreate,
    /// Members are keyed: update matches, create new, delete absent.
    ReconcileByKey,
}
