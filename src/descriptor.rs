use crate::{Result, Value};
use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, LazyLock, Mutex, RwLock},
};

/// Navigation recursion bound. Cyclic entity graphs terminate here.
pub const MAX_NAVIGATION_DEPTH: usize = 8;

/// A type whose instances correspond to table rows.
///
/// Implementations declare their shape once through [`Entity::schema`]; the
/// catalog turns that declaration into an immutable [`EntityDescriptor`]
/// cached per type.
pub trait Entity: Sized + Send + 'static {
    /// Declarative shape: table name, properties, identity, navigations.
    fn schema() -> EntitySchema;

    /// Rebuild an instance from mapped fields. Called by the compiled
    /// materializer, which feeds values resolved per the descriptor.
    fn from_fields(fields: &mut crate::FieldSource<'_>) -> Result<Self>;

    /// Scalar property values in declaration order, consumed by the compiled
    /// parameter binder. Navigation properties are not listed.
    fn field_values(&self) -> Vec<(&'static str, Value)>;
}

/// Declarative entity description, the input to descriptor resolution.
/// Table and column names given here are the naming overrides; a property
/// marked ignored never reaches the descriptor.
pub struct EntitySchema {
    pub table: &'static str,
    pub properties: Vec<SchemaProperty>,
}

pub struct SchemaProperty {
    pub name: &'static str,
    pub column: &'static str,
    pub ignored: bool,
    pub identity: bool,
    pub kind: SchemaPropertyKind,
}

pub enum SchemaPropertyKind {
    Scalar(Value),
    Navigation {
        target: TypeId,
        schema: fn() -> EntitySchema,
        /// Explicit join column on the owning side; `None` falls back to the
        /// `<Property>Id` convention.
        foreign_key: Option<&'static str>,
    },
}

impl EntitySchema {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            properties: Vec::new(),
        }
    }

    pub fn identity(mut self, name: &'static str, shape: Value) -> Self {
        self.properties.push(SchemaProperty {
            name,
            column: name,
            ignored: false,
            identity: true,
            kind: SchemaPropertyKind::Scalar(shape),
        });
        self
    }

    pub fn scalar(self, name: &'static str, shape: Value) -> Self {
        self.scalar_as(name, name, shape)
    }

    /// Scalar property with a column-name override.
    pub fn scalar_as(mut self, name: &'static str, column: &'static str, shape: Value) -> Self {
        self.properties.push(SchemaProperty {
            name,
            column,
            ignored: false,
            identity: false,
            kind: SchemaPropertyKind::Scalar(shape),
        });
        self
    }

    /// Navigation property joined through the `<name>Id` convention.
    pub fn navigation<C: Entity>(self, name: &'static str) -> Self {
        self.navigation_on::<C>(name, None)
    }

    /// Navigation property with an explicit join column.
    pub fn navigation_via<C: Entity>(self, name: &'static str, foreign_key: &'static str) -> Self {
        self.navigation_on::<C>(name, Some(foreign_key))
    }

    fn navigation_on<C: Entity>(
        mut self,
        name: &'static str,
        foreign_key: Option<&'static str>,
    ) -> Self {
        self.properties.push(SchemaProperty {
            name,
            column: name,
            ignored: false,
            identity: false,
            kind: SchemaPropertyKind::Navigation {
                target: TypeId::of::<C>(),
                schema: C::schema,
                foreign_key,
            },
        });
        self
    }

    /// Declared but never mapped.
    pub fn ignore(mut self, name: &'static str) -> Self {
        self.properties.push(SchemaProperty {
            name,
            column: name,
            ignored: true,
            identity: false,
            kind: SchemaPropertyKind::Scalar(Value::Null),
        });
        self
    }
}

/// One scalar property → column binding.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub property: &'static str,
    pub column: String,
    pub shape: Value,
    pub identity: bool,
}

/// One navigation property → joined child binding. `foreign_key` is the
/// column on the owning table, matched against the child's identity column.
#[derive(Debug, Clone)]
pub struct NavigationMap {
    pub property: &'static str,
    pub foreign_key: String,
    pub target: TypeId,
    pub child: Arc<EntityDescriptor>,
}

/// Immutable per-type metadata: table, identity, scalar columns, navigations.
/// Built once, cached by type identity.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub table: String,
    pub columns: Vec<ColumnMap>,
    pub navigations: Vec<NavigationMap>,
}

impl EntityDescriptor {
    pub fn identity(&self) -> Option<&ColumnMap> {
        self.columns.iter().find(|c| c.identity)
    }

    pub fn column(&self, property: &str) -> Option<&ColumnMap> {
        self.columns.iter().find(|c| c.property == property)
    }

    pub fn navigation(&self, property: &str) -> Option<&NavigationMap> {
        self.navigations.iter().find(|n| n.property == property)
    }

    /// Result-set alias of a navigation child's column in nested projections.
    pub fn nested_alias(navigation: &str, column: &str) -> String {
        format!("{}_{}", navigation, column)
    }
}

fn build_descriptor(schema: &EntitySchema, depth: usize) -> EntityDescriptor {
    let mut columns = Vec::new();
    let mut navigations = Vec::new();
    for property in schema.properties.iter().filter(|p| !p.ignored) {
        match &property.kind {
            SchemaPropertyKind::Scalar(shape) => columns.push(ColumnMap {
                property: property.name,
                column: property.column.to_string(),
                shape: shape.clone(),
                identity: property.identity,
            }),
            SchemaPropertyKind::Navigation {
                target,
                schema: child_schema,
                foreign_key,
            } => {
                if depth == 0 {
                    continue;
                }
                let child = build_descriptor(&child_schema(), depth - 1);
                // A candidate is a navigation property only when the child
                // carries an identity column and a join column is declared or
                // derivable; anything else is skipped, not an error.
                if child.identity().is_none() {
                    continue;
                }
                let convention = format!("{}Id", property.name);
                let foreign_key = match foreign_key {
                    Some(explicit) => explicit.to_string(),
                    None => {
                        let Some(derived) = schema
                            .properties
                            .iter()
                            .filter(|p| !p.ignored)
                            .find(|p| p.name == convention)
                        else {
                            continue;
                        };
                        derived.column.to_string()
                    }
                };
                navigations.push(NavigationMap {
                    property: property.name,
                    foreign_key,
                    target: *target,
                    child: Arc::new(child),
                });
            }
        }
    }
    EntityDescriptor {
        table: schema.table.to_string(),
        columns,
        navigations,
    }
}

type DescriptorMap = HashMap<TypeId, Arc<EntityDescriptor>>;

/// Process-wide descriptor cache. Reads go through a copy-on-write snapshot;
/// the compile mutex guarantees exactly one build per type under concurrent
/// first use.
pub struct MetadataCatalog {
    snapshot: RwLock<Arc<DescriptorMap>>,
    compile: Mutex<()>,
}

impl MetadataCatalog {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(HashMap::new())),
            compile: Mutex::new(()),
        }
    }

    pub fn resolve<E: Entity>(&self) -> Arc<EntityDescriptor> {
        self.resolve_dyn(TypeId::of::<E>(), E::schema)
    }

    /// Resolution by type identity and schema function, for callers that
    /// only hold the type erased.
    pub fn resolve_dyn(&self, key: TypeId, schema: fn() -> EntitySchema) -> Arc<EntityDescriptor> {
        if let Some(found) = self.lookup(&key) {
            return found;
        }
        let _compiling = self
            .compile
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(found) = self.lookup(&key) {
            return found;
        }
        let built = Arc::new(build_descriptor(&schema(), MAX_NAVIGATION_DEPTH));
        let mut snapshot = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut map = DescriptorMap::clone(&snapshot);
        map.insert(key, built.clone());
        *snapshot = Arc::new(map);
        built
    }

    fn lookup(&self, key: &TypeId) -> Option<Arc<EntityDescriptor>> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

impl Default for MetadataCatalog {
    fn default() -> Self {
        Self::new()
    }
}

static CATALOG: LazyLock<MetadataCatalog> = LazyLock::new(MetadataCatalog::new);

/// Resolve `E`'s descriptor through the process-wide catalog.
pub fn resolve<E: Entity>() -> Arc<EntityDescriptor> {
    CATALOG.resolve::<E>()
}
