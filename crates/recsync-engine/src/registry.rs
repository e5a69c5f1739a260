//! Typed record-type registry, validated at startup.
//!
//! Holds one [`RecordTypeSpec`] per record type and the dependency order the
//! orchestrator walks: parents before the types that reference them, ties
//! broken by declaration order.

use std::collections::{BTreeSet, HashMap};

use recsync_store::SheetBinding;
use recsync_types::job::Operation;
use recsync_types::record::RecordType;

use crate::config::types::{RecordTypeConfig, SyncConfig};
use crate::transform::FieldTransform;

/// Everything the engine needs to sync one record type.
#[derive(Debug, Clone)]
pub struct RecordTypeSpec {
    pub record_type: RecordType,
    pub sheet: String,
    pub natural_key: String,
    pub identifier_column: String,
    pub operation: Operation,
    pub external_id: Option<String>,
    pub never_transmit: BTreeSet<String>,
    /// Applied in order.
    pub transforms: Vec<(String, FieldTransform)>,
    pub depends_on: Vec<RecordType>,
}

impl RecordTypeSpec {
    /// A spec with default sheet (`name`), natural key (`Name`) and
    /// identifier column (`Id`).
    #[must_use]
    pub fn new(name: impl Into<String>, operation: Operation) -> Self {
        let name = name.into();
        Self {
            record_type: RecordType::new(name.clone()),
            sheet: name,
            natural_key: "Name".to_string(),
            identifier_column: "Id".to_string(),
            operation,
            external_id: None,
            never_transmit: BTreeSet::new(),
            transforms: Vec::new(),
            depends_on: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &RecordTypeConfig) -> Self {
        Self {
            record_type: RecordType::new(config.name.clone()),
            sheet: config.sheet.clone().unwrap_or_else(|| config.name.clone()),
            natural_key: config.natural_key.clone(),
            identifier_column: config.identifier_column.clone(),
            operation: config.operation,
            external_id: config.external_id.clone(),
            never_transmit: config.never_transmit.iter().cloned().collect(),
            transforms: config
                .transforms
                .iter()
                .map(|(field, t)| (field.clone(), FieldTransform::from(t)))
                .collect(),
            depends_on: config.depends_on.iter().map(RecordType::new).collect(),
        }
    }

    #[must_use]
    pub fn sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = sheet.into();
        self
    }

    #[must_use]
    pub fn natural_key(mut self, field: impl Into<String>) -> Self {
        self.natural_key = field.into();
        self
    }

    #[must_use]
    pub fn identifier_column(mut self, column: impl Into<String>) -> Self {
        self.identifier_column = column.into();
        self
    }

    #[must_use]
    pub fn external_id(mut self, field: impl Into<String>) -> Self {
        self.external_id = Some(field.into());
        self
    }

    #[must_use]
    pub fn never_transmit(mut self, field: impl Into<String>) -> Self {
        self.never_transmit.insert(field.into());
        self
    }

    #[must_use]
    pub fn transform(mut self, field: impl Into<String>, transform: FieldTransform) -> Self {
        self.transforms.push((field.into(), transform));
        self
    }

    #[must_use]
    pub fn depends_on(mut self, record_type: impl Into<RecordType>) -> Self {
        self.depends_on.push(record_type.into());
        self
    }

    #[must_use]
    pub fn binding(&self) -> SheetBinding {
        SheetBinding::new(
            self.record_type.clone(),
            self.sheet.clone(),
            self.natural_key.clone(),
        )
    }

    /// External-id field passed on upsert (`Id` unless configured).
    #[must_use]
    pub fn upsert_key(&self, operation: Operation) -> Option<&str> {
        (operation == Operation::Upsert).then(|| self.external_id.as_deref().unwrap_or("Id"))
    }
}

/// Registry construction and lookup errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("record type '{0}' is registered twice")]
    Duplicate(String),
    #[error("record type '{record_type}' depends on unknown record type '{dependency}'")]
    UnknownDependency {
        record_type: String,
        dependency: String,
    },
    #[error("dependency cycle among record types: {}", .0.join(", "))]
    Cycle(Vec<String>),
    #[error("unknown record type '{0}'")]
    UnknownRecordType(String),
}

/// Record types in dependency order.
#[derive(Debug, Clone)]
pub struct Registry {
    specs: Vec<RecordTypeSpec>,
    index: HashMap<RecordType, usize>,
}

impl Registry {
    /// Validate `specs` and order them by dependency.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] on duplicate names, unknown dependencies or
    /// a dependency cycle.
    pub fn new(specs: Vec<RecordTypeSpec>) -> Result<Self, RegistryError> {
        let mut position = HashMap::new();
        for (i, spec) in specs.iter().enumerate() {
            if position.insert(spec.record_type.clone(), i).is_some() {
                return Err(RegistryError::Duplicate(spec.record_type.to_string()));
            }
        }
        for spec in &specs {
            for dep in &spec.depends_on {
                if !position.contains_key(dep) {
                    return Err(RegistryError::UnknownDependency {
                        record_type: spec.record_type.to_string(),
                        dependency: dep.to_string(),
                    });
                }
            }
        }

        let order = dependency_order(&specs, &position)?;
        let mut slots: Vec<Option<RecordTypeSpec>> = specs.into_iter().map(Some).collect();
        let ordered: Vec<RecordTypeSpec> = order
            .into_iter()
            .filter_map(|i| slots[i].take())
            .collect();
        let index = ordered
            .iter()
            .enumerate()
            .map(|(i, spec)| (spec.record_type.clone(), i))
            .collect();

        Ok(Self {
            specs: ordered,
            index,
        })
    }

    /// Build from a validated [`SyncConfig`].
    ///
    /// # Errors
    ///
    /// See [`Registry::new`].
    pub fn from_config(config: &SyncConfig) -> Result<Self, RegistryError> {
        Self::new(
            config
                .record_types
                .iter()
                .map(RecordTypeSpec::from_config)
                .collect(),
        )
    }

    /// Add or replace a field transform, typically a [`FieldTransform::Custom`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownRecordType`] for an unregistered type.
    pub fn register_transform(
        &mut self,
        record_type: &str,
        field: impl Into<String>,
        transform: FieldTransform,
    ) -> Result<(), RegistryError> {
        let i = *self
            .index
            .get(&RecordType::new(record_type))
            .ok_or_else(|| RegistryError::UnknownRecordType(record_type.to_string()))?;
        let field = field.into();
        let transforms = &mut self.specs[i].transforms;
        if let Some(slot) = transforms.iter_mut().find(|(f, _)| *f == field) {
            slot.1 = transform;
        } else {
            transforms.push((field, transform));
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, record_type: &RecordType) -> Option<&RecordTypeSpec> {
        self.index.get(record_type).map(|&i| &self.specs[i])
    }

    /// All specs, dependency order.
    pub fn iter(&self) -> impl Iterator<Item = &RecordTypeSpec> {
        self.specs.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// The named types (all when `names` is empty), in dependency order.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownRecordType`] for the first unknown name.
    pub fn select(&self, names: &[String]) -> Result<Vec<&RecordTypeSpec>, RegistryError> {
        if names.is_empty() {
            return Ok(self.specs.iter().collect());
        }
        let mut wanted = BTreeSet::new();
        for name in names {
            let i = self
                .index
                .get(&RecordType::new(name.as_str()))
                .ok_or_else(|| RegistryError::UnknownRecordType(name.clone()))?;
            wanted.insert(*i);
        }
        Ok(wanted.into_iter().map(|i| &self.specs[i]).collect())
    }
}

/// Kahn's algorithm; among ready types the earliest declared goes first.
fn dependency_order(
    specs: &[RecordTypeSpec],
    position: &HashMap<RecordType, usize>,
) -> Result<Vec<usize>, RegistryError> {
    let mut pending: Vec<usize> = specs
        .iter()
        .map(|spec| {
            spec.depends_on
                .iter()
                .collect::<BTreeSet<_>>()
                .len()
        })
        .collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); specs.len()];
    for (i, spec) in specs.iter().enumerate() {
        for dep in spec.depends_on.iter().collect::<BTreeSet<_>>() {
            dependents[position[dep]].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..specs.len()).filter(|&i| pending[i] == 0).collect();
    let mut order = Vec::with_capacity(specs.len());
    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            pending[d] -= 1;
            if pending[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() < specs.len() {
        let stuck = (0..specs.len())
            .filter(|i| pending[*i] > 0)
            .map(|i| specs[i].record_type.to_string())
            .collect();
        return Err(RegistryError::Cycle(stuck));
    }
    Ok(order)
}
