use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
};

use serde::Serialize;

use super::{
    DataType, DtFetchBuilder, DtUpdateBuilder, Fetched, SetDelta, UpdatePayload, WireDataType,
    utf8_lossy,
};
use crate::{
    command::{CommandError, CommandKind},
    pb::{self, map_field::MapFieldType, map_update::FlagOp},
    render,
    validate::{OptionSpec, ValidationError},
};

/// Marker for map fetches.
pub enum Map {}

/// The type half of a map field's identity; a map may hold a counter and a
/// set under the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MapFieldKind {
    Counter,
    Set,
    Register,
    Flag,
    Map,
}

impl MapFieldKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Set => "set",
            Self::Register => "register",
            Self::Flag => "flag",
            Self::Map => "map",
        }
    }

    fn to_pb(self) -> MapFieldType {
        match self {
            Self::Counter => MapFieldType::Counter,
            Self::Set => MapFieldType::Set,
            Self::Register => MapFieldType::Register,
            Self::Flag => MapFieldType::Flag,
            Self::Map => MapFieldType::Map,
        }
    }

    fn from_pb(value: MapFieldType) -> Self {
        match value {
            MapFieldType::Counter => Self::Counter,
            MapFieldType::Set => Self::Set,
            MapFieldType::Register => Self::Register,
            MapFieldType::Flag => Self::Flag,
            MapFieldType::Map => Self::Map,
        }
    }
}

impl std::fmt::Display for MapFieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MapFieldKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "counter" => Ok(Self::Counter),
            "set" => Ok(Self::Set),
            "register" => Ok(Self::Register),
            "flag" => Ok(Self::Flag),
            "map" => Ok(Self::Map),
            other => Err(ValidationError::invalid(
                "map_op",
                format!("unknown field kind {other:?}"),
            )),
        }
    }
}

fn field(kind: MapFieldKind, name: &str) -> pb::MapField {
    let mut field = pb::MapField {
        name: Some(name.as_bytes().to_vec()),
        ..Default::default()
    };
    field.set_field_type(kind.to_pb());
    field
}

/// Accumulated changes to one map, including nested maps.
///
/// Repeated calls against the same field merge: counter increments add up,
/// set changes are grouped, and the last register or flag value wins.
/// Removing a field discards pending changes to it, and a later change to a
/// removed field cancels the removal. Increments whose sum leaves the `i64`
/// range are kept aside and rejected when the update is built.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapOperation {
    counters: BTreeMap<String, i64>,
    sets: BTreeMap<String, SetDelta>,
    registers: BTreeMap<String, Vec<u8>>,
    flags: BTreeMap<String, bool>,
    maps: BTreeMap<String, MapOperation>,
    removes: BTreeSet<(MapFieldKind, String)>,
    overflowed: BTreeSet<String>,
}

impl MapOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_counter(&mut self, name: impl Into<String>, increment: i64) -> &mut Self {
        let name = name.into();
        self.unremove(MapFieldKind::Counter, &name);
        if self.overflowed.contains(&name) {
            return self;
        }
        let current = self.counters.get(&name).copied().unwrap_or(0);
        match current.checked_add(increment) {
            Some(total) => {
                self.counters.insert(name, total);
            }
            None => {
                self.counters.remove(&name);
                self.overflowed.insert(name);
            }
        }
        self
    }

    pub fn add_to_set(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        let name = name.into();
        self.unremove(MapFieldKind::Set, &name);
        self.sets.entry(name).or_default().additions.push(value.into());
        self
    }

    pub fn remove_from_set(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> &mut Self {
        let name = name.into();
        self.unremove(MapFieldKind::Set, &name);
        self.sets.entry(name).or_default().removals.push(value.into());
        self
    }

    pub fn set_register(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        let name = name.into();
        self.unremove(MapFieldKind::Register, &name);
        self.registers.insert(name, value.into());
        self
    }

    pub fn set_flag(&mut self, name: impl Into<String>, enabled: bool) -> &mut Self {
        let name = name.into();
        self.unremove(MapFieldKind::Flag, &name);
        self.flags.insert(name, enabled);
        self
    }

    /// Operation on the nested map `name`, created on first use.
    pub fn map(&mut self, name: impl Into<String>) -> &mut MapOperation {
        let name = name.into();
        self.unremove(MapFieldKind::Map, &name);
        self.maps.entry(name).or_default()
    }

    pub fn remove(&mut self, kind: MapFieldKind, name: impl Into<String>) -> &mut Self {
        let name = name.into();
        match kind {
            MapFieldKind::Counter => {
                self.counters.remove(&name);
                self.overflowed.remove(&name);
            }
            MapFieldKind::Set => {
                self.sets.remove(&name);
            }
            MapFieldKind::Register => {
                self.registers.remove(&name);
            }
            MapFieldKind::Flag => {
                self.flags.remove(&name);
            }
            MapFieldKind::Map => {
                self.maps.remove(&name);
            }
        }
        self.removes.insert((kind, name));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.sets.is_empty()
            && self.registers.is_empty()
            && self.flags.is_empty()
            && self.removes.is_empty()
            && self.maps.values().all(MapOperation::is_empty)
    }

    /// Dotted path of the first counter whose merged increment overflowed.
    fn overflowed_counter(&self) -> Option<String> {
        if let Some(name) = self.overflowed.iter().next() {
            return Some(name.clone());
        }
        self.maps.iter().find_map(|(name, nested)| {
            nested
                .overflowed_counter()
                .map(|path| format!("{name}.{path}"))
        })
    }

    fn unremove(&mut self, kind: MapFieldKind, name: &str) {
        if !self.removes.is_empty() {
            self.removes.remove(&(kind, name.to_string()));
        }
    }

    /// Updates are ordered by field kind, then by name.
    pub(super) fn to_pb(&self) -> pb::MapOp {
        let mut updates = Vec::new();

        for (name, increment) in &self.counters {
            updates.push(pb::MapUpdate {
                field: Some(field(MapFieldKind::Counter, name)),
                counter_op: Some(pb::CounterOp {
                    increment: Some(*increment),
                }),
                ..Default::default()
            });
        }
        for (name, delta) in &self.sets {
            updates.push(pb::MapUpdate {
                field: Some(field(MapFieldKind::Set, name)),
                set_op: Some(delta.to_pb()),
                ..Default::default()
            });
        }
        for (name, value) in &self.registers {
            updates.push(pb::MapUpdate {
                field: Some(field(MapFieldKind::Register, name)),
                register_op: Some(value.clone()),
                ..Default::default()
            });
        }
        for (name, enabled) in &self.flags {
            let mut update = pb::MapUpdate {
                field: Some(field(MapFieldKind::Flag, name)),
                ..Default::default()
            };
            update.set_flag_op(if *enabled {
                FlagOp::Enable
            } else {
                FlagOp::Disable
            });
            updates.push(update);
        }
        for (name, nested) in &self.maps {
            if nested.is_empty() {
                continue;
            }
            updates.push(pb::MapUpdate {
                field: Some(field(MapFieldKind::Map, name)),
                map_op: Some(nested.to_pb().into()),
                ..Default::default()
            });
        }

        pb::MapOp {
            removes: self
                .removes
                .iter()
                .map(|(kind, name)| field(*kind, name))
                .collect(),
            updates,
        }
    }
}

/// A map's contents keyed by field name, one table per field kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MapValue {
    pub counters: BTreeMap<String, i64>,
    #[serde(serialize_with = "render::bytes_list_map")]
    pub sets: BTreeMap<String, Vec<Vec<u8>>>,
    #[serde(serialize_with = "render::bytes_map")]
    pub registers: BTreeMap<String, Vec<u8>>,
    pub flags: BTreeMap<String, bool>,
    pub maps: BTreeMap<String, MapValue>,
}

impl MapValue {
    fn from_entries(entries: Vec<pb::MapEntry>) -> Result<Self, CommandError> {
        let mut map = MapValue::default();
        for entry in entries {
            let field = entry
                .field
                .as_ref()
                .ok_or_else(|| CommandError::decode("map entry without a field"))?;
            let raw = field
                .field_type
                .ok_or_else(|| CommandError::decode("map field without a type"))?;
            let kind = MapFieldType::try_from(raw)
                .map(MapFieldKind::from_pb)
                .map_err(|_| CommandError::decode(format!("unknown map field type {raw}")))?;
            let name = utf8_lossy(field.name());

            match kind {
                MapFieldKind::Counter => {
                    map.counters.insert(name, entry.counter_value());
                }
                MapFieldKind::Set => {
                    map.sets.insert(name, entry.set_value);
                }
                MapFieldKind::Register => {
                    map.registers
                        .insert(name, entry.register_value.unwrap_or_default());
                }
                MapFieldKind::Flag => {
                    map.flags.insert(name, entry.flag_value());
                }
                MapFieldKind::Map => {
                    map.maps.insert(name, MapValue::from_entries(entry.map_value)?);
                }
            }
        }
        Ok(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapFetch {
    pub map: MapValue,
    #[serde(serialize_with = "render::opt_bytes", skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<u8>>,
    pub is_not_found: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_key: Option<String>,
    #[serde(serialize_with = "render::opt_bytes", skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<u8>>,
    pub map: MapValue,
}

impl DataType for Map {
    type Value = MapFetch;

    const FETCH_KIND: CommandKind = CommandKind::FetchMap;
    const DEFAULT_BUCKET_TYPE: &'static str = "maps";
    const FETCH_OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::defaulted("bucket_type", "maps"),
        OptionSpec::required("bucket"),
        OptionSpec::required("key"),
        OptionSpec::optional("r"),
        OptionSpec::optional("pr"),
        OptionSpec::optional("notfound_ok"),
        OptionSpec::optional("use_basic_quorum"),
        OptionSpec::optional("timeout"),
        OptionSpec::defaulted("include_context", "true"),
    ];
    const ACCEPTS: &'static [WireDataType] = &[WireDataType::Map];

    fn decode_fetch(fetched: Fetched) -> Result<MapFetch, CommandError> {
        let is_not_found = fetched.value.is_none();
        let map = match fetched.value {
            Some(value) => MapValue::from_entries(value.map_value)?,
            None => MapValue::default(),
        };
        Ok(MapFetch {
            map,
            context: fetched.context,
            is_not_found,
        })
    }
}

impl DtFetchBuilder<Map> {
    pub fn with_include_context(mut self, include_context: bool) -> Self {
        self.params.include_context = Some(include_context);
        self
    }
}

impl UpdatePayload for MapOperation {
    type Draft = MapOperation;
    type Output = MapUpdate;

    const KIND: CommandKind = CommandKind::UpdateMap;
    const DEFAULT_BUCKET_TYPE: &'static str = "maps";
    const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::defaulted("bucket_type", "maps"),
        OptionSpec::required("bucket"),
        OptionSpec::required("map_op"),
        OptionSpec::optional("key"),
        OptionSpec::optional("context"),
        OptionSpec::optional("w"),
        OptionSpec::optional("dw"),
        OptionSpec::optional("pw"),
        OptionSpec::defaulted("return_body", "true"),
        OptionSpec::optional("timeout"),
    ];

    fn from_draft(draft: MapOperation) -> Result<Self, ValidationError> {
        if let Some(path) = draft.overflowed_counter() {
            return Err(ValidationError::invalid(
                "map_op",
                format!("increments to counter {path:?} overflow i64"),
            ));
        }
        if draft.is_empty() {
            return Err(ValidationError::empty("map_op"));
        }
        Ok(draft)
    }

    fn to_op(&self) -> pb::DtOp {
        pb::DtOp {
            map_op: Some(self.to_pb()),
            ..Default::default()
        }
    }

    fn decode_update(
        generated_key: Option<String>,
        response: pb::DtUpdateResp,
    ) -> Result<MapUpdate, CommandError> {
        Ok(MapUpdate {
            generated_key,
            context: response.context,
            map: MapValue::from_entries(response.map_value)?,
        })
    }
}

impl DtUpdateBuilder<MapOperation> {
    pub fn with_map_op(mut self, op: MapOperation) -> Self {
        self.draft = op;
        self
    }

    /// Required by the server when the operation removes anything.
    pub fn with_context(mut self, context: impl Into<Vec<u8>>) -> Self {
        self.context = Some(context.into());
        self
    }
}
