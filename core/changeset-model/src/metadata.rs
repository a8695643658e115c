use changeset_types::ClassId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Mapping facts the host ORM knows about a class.
///
/// Field-level configuration lookups are checked against these: a field not
/// listed here (as a scalar field or an association) does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMetadata {
    pub class: ClassId,
    /// Identifier fields, in declaration order.
    #[serde(default)]
    pub identifier: Vec<String>,
    /// Scalar fields.
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub associations: IndexMap<String, AssociationMapping>,
}

impl ClassMetadata {
    pub fn new(class: impl Into<ClassId>) -> Self {
        Self {
            class: class.into(),
            identifier: Vec::new(),
            fields: Vec::new(),
            associations: IndexMap::new(),
        }
    }

    /// Sets the identifier fields. Each is also registered as a scalar field.
    pub fn identifier<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifier = fields.into_iter().map(Into::into).collect();
        for id in self.identifier.clone() {
            if !self.fields.contains(&id) {
                self.fields.push(id);
            }
        }
        self
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for field in fields {
            let field = field.into();
            if !self.fields.contains(&field) {
                self.fields.push(field);
            }
        }
        self
    }

    pub fn association(mut self, field: impl Into<String>, mapping: AssociationMapping) -> Self {
        self.associations.insert(field.into(), mapping);
        self
    }

    /// True for scalar fields and associations alike.
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
            || self.identifier.iter().any(|f| f == field)
            || self.associations.contains_key(field)
    }

    pub fn association_for(&self, field: &str) -> Option<&AssociationMapping> {
        self.associations.get(field)
    }
}

/// How many entities an association field holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// Which side of a bidirectional association a field is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "snake_case")]
pub enum AssociationSide {
    /// Authoritative side. `inversed_by` names the mirror field on the target.
    Owning {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inversed_by: Option<String>,
    },
    /// Derived side. `mapped_by` names the owning field on the target.
    Inverse { mapped_by: String },
}

/// An association field's mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationMapping {
    pub target: ClassId,
    pub cardinality: Cardinality,
    #[serde(flatten)]
    pub side: AssociationSide,
}

impl AssociationMapping {
    /// Unidirectional owning to-one association.
    pub fn to_one(target: impl Into<ClassId>) -> Self {
        Self {
            target: target.into(),
            cardinality: Cardinality::ToOne,
            side: AssociationSide::Owning { inversed_by: None },
        }
    }

    /// Unidirectional owning to-many association.
    pub fn to_many(target: impl Into<ClassId>) -> Self {
        Self {
            target: target.into(),
            cardinality: Cardinality::ToMany,
            side: AssociationSide::Owning { inversed_by: None },
        }
    }

    /// Makes this the owning side of a bidirectional association.
    pub fn inversed_by(mut self, field: impl Into<String>) -> Self {
        self.side = AssociationSide::Owning {
            inversed_by: Some(field.into()),
        };
        self
    }

    /// Makes this the inverse side of a bidirectional association.
    pub fn mapped_by(mut self, field: impl Into<String>) -> Self {
        self.side = AssociationSide::Inverse {
            mapped_by: field.into(),
        };
        self
    }

    pub fn is_owning(&self) -> bool {
        matches!(self.side, AssociationSide::Owning { .. })
    }

    /// The mirror field on the target, when this is a bidirectional owning side.
    pub fn inverse_field(&self) -> Option<&str> {
        match &self.side {
            AssociationSide::Owning { inversed_by } => inversed_by.as_deref(),
            AssociationSide::Inverse { .. } => None,
        }
    }

    pub fn is_collection(&self) -> bool {
        self.cardinality == Cardinality::ToMany
    }
}
