use crate::{AsValue, Entity, EntityDescriptor, Error, Result, RowLabeled, Value, resolve};
use std::{
    any::TypeId,
    collections::HashMap,
    sync::{Arc, LazyLock, Mutex, RwLock},
};

/// Field access handed to [`Entity::from_fields`] by a compiled materializer.
/// Column lookup goes through the descriptor, so naming overrides and nested
/// prefixes are already applied.
pub struct FieldSource<'a> {
    row: &'a RowLabeled,
    descriptor: &'a EntityDescriptor,
    prefix: Option<&'a str>,
}

impl<'a> FieldSource<'a> {
    fn label(&self, column: &str) -> String {
        match self.prefix {
            Some(prefix) => EntityDescriptor::nested_alias(prefix, column),
            None => column.to_string(),
        }
    }

    /// Value of a scalar property. A column absent from the result set reads
    /// as NULL, so optional targets simply come back `None`.
    pub fn take<T: AsValue>(&mut self, property: &'static str) -> Result<T> {
        let map = self.descriptor.column(property).ok_or_else(|| {
            Error::msg(format!(
                "No column mapped for property `{}` on table `{}`",
                property, self.descriptor.table
            ))
        })?;
        let value = self
            .row
            .get_column(&self.label(&map.column))
            .cloned()
            .unwrap_or(Value::Null);
        T::try_from_value(value)
    }

    /// Materialize a navigation sub-object from its prefixed column subset.
    /// Returns `None` when the row carries no columns for the navigation or
    /// when the joined identity came back NULL.
    pub fn child<C: Entity>(&mut self, property: &'static str) -> Result<Option<C>> {
        let Some(navigation) = self.descriptor.navigation(property) else {
            return Ok(None);
        };
        let Some(identity) = navigation.child.identity() else {
            return Ok(None);
        };
        let identity_label = EntityDescriptor::nested_alias(property, &identity.column);
        match self.row.get_column(&identity_label) {
            None => Ok(None),
            Some(v) if v.is_null() => Ok(None),
            Some(_) => {
                let mut nested = FieldSource {
                    row: self.row,
                    descriptor: &navigation.child,
                    prefix: Some(property),
                };
                C::from_fields(&mut nested).map(Some)
            }
        }
    }
}

/// Compiled row-materialization plan for one entity type.
pub struct Materializer {
    descriptor: Arc<EntityDescriptor>,
}

impl Materializer {
    pub fn materialize<E: Entity>(&self, row: &RowLabeled) -> Result<E> {
        E::from_fields(&mut FieldSource {
            row,
            descriptor: &self.descriptor,
            prefix: None,
        })
    }
}

/// One entity field bound for statement building.
#[derive(Debug, Clone)]
pub struct BoundField {
    pub property: &'static str,
    pub column: String,
    pub value: Value,
    pub identity: bool,
}

/// Compiled entity → parameters plan for one entity type.
pub struct Binder {
    descriptor: Arc<EntityDescriptor>,
}

impl Binder {
    /// Bound fields in descriptor order. Properties without a mapped column
    /// (ignore markers) are skipped.
    pub fn bind<E: Entity>(&self, entity: &E) -> Vec<BoundField> {
        let values: HashMap<&'static str, Value> = entity.field_values().into_iter().collect();
        self.descriptor
            .columns
            .iter()
            .filter_map(|c| {
                values.get(c.property).map(|value| BoundField {
                    property: c.property,
                    column: c.column.clone(),
                    value: value.clone(),
                    identity: c.identity,
                })
            })
            .collect()
    }
}

type PlanMap<P> = HashMap<TypeId, Arc<P>>;

/// Lazily compiles and caches, once per type, a row materializer and a
/// parameter binder. Double-checked locking: the snapshot is copy-on-write,
/// the compile mutex serializes first builds, so exactly one compilation
/// happens per key and post-race reads never block.
pub struct MappingCompiler {
    materializers: RwLock<Arc<PlanMap<Materializer>>>,
    binders: RwLock<Arc<PlanMap<Binder>>>,
    compile: Mutex<()>,
}

impl MappingCompiler {
    pub fn new() -> Self {
        Self {
            materializers: RwLock::new(Arc::new(HashMap::new())),
            binders: RwLock::new(Arc::new(HashMap::new())),
            compile: Mutex::new(()),
        }
    }

    pub fn materializer<E: Entity>(&self) -> Arc<Materializer> {
        Self::resolve_plan(&self.materializers, &self.compile, TypeId::of::<E>(), || {
            Materializer {
                descriptor: resolve::<E>(),
            }
        })
    }

    pub fn binder<E: Entity>(&self) -> Arc<Binder> {
        Self::resolve_plan(&self.binders, &self.compile, TypeId::of::<E>(), || Binder {
            descriptor: resolve::<E>(),
        })
    }

    fn resolve_plan<P>(
        cache: &RwLock<Arc<PlanMap<P>>>,
        compile: &Mutex<()>,
        key: TypeId,
        build: impl FnOnce() -> P,
    ) -> Arc<P> {
        if let Some(found) = Self::lookup(cache, &key) {
            return found;
        }
        let _compiling = compile.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(found) = Self::lookup(cache, &key) {
            return found;
        }
        let built = Arc::new(build());
        let mut snapshot = cache.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut map = PlanMap::clone(&snapshot);
        map.insert(key, built.clone());
        *snapshot = Arc::new(map);
        built
    }

    fn lookup<P>(cache: &RwLock<Arc<PlanMap<P>>>, key: &TypeId) -> Option<Arc<P>> {
        cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

impl Default for MappingCompiler {
    fn default() -> Self {
        Self::new()
    }
}

static MAPPING: LazyLock<MappingCompiler> = LazyLock::new(MappingCompiler::new);

pub fn materializer<E: Entity>() -> Arc<Materializer> {
    MAPPING.materializer::<E>()
}

pub fn binder<E: Entity>() -> Arc<Binder> {
    MAPPING.binder::<E>()
}
