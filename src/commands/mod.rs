//! One [`Operation`](crate::command::Operation) per supported request kind.

pub mod crdt;
pub mod ts;
pub mod yokozuna;

pub use crdt::{
    CounterUpdate, CounterValue, FetchCounter, FetchHll, FetchMap, FetchSet, HllUpdate, HllValue,
    MapFetch, MapFieldKind, MapOperation, MapUpdate, MapValue, SetUpdate, SetValue, UpdateCounter,
    UpdateGSet, UpdateHll, UpdateMap, UpdateSet,
};
pub use ts::{TsCell, TsDelete, TsDeleteBuilder};
pub use yokozuna::{DEFAULT_SCHEMA_NAME, FetchSchema, FetchSchemaBuilder, Schema};
