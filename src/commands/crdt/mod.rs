//! Fetch and update commands for the convergent data types.
//!
//! All fetches share one request shape (`DtFetchReq`) and all updates share
//! `DtUpdateReq`; the data type only decides the default bucket type, which
//! operation goes into `DtOp` and how the value in the response is read. Each
//! data type is therefore a marker (`Counter`, `Set`, `Map`, `Hll`) or payload
//! type plugged into the generic [`DtFetch`] / [`DtUpdate`] operations.

use std::marker::PhantomData;

use crate::{
    command::{BuilderCore, Command, CommandBuilder, CommandError, CommandKind, Operation},
    pb::{self, dt_fetch_resp::DataType as WireDataType},
    validate::{self, OptionSpec, ValidationError},
};

pub mod counter;
pub mod hll;
pub mod map;
pub mod set;

pub use counter::{Counter, CounterIncrement, CounterUpdate, CounterValue};
pub use hll::{Hll, HllAdditions, HllUpdate, HllValue};
pub use map::{Map, MapFetch, MapFieldKind, MapOperation, MapUpdate, MapValue};
pub use set::{GSetAdditions, Set, SetDelta, SetUpdate, SetValue};

pub type FetchCounter = DtFetch<Counter>;
pub type FetchSet = DtFetch<Set>;
pub type FetchMap = DtFetch<Map>;
pub type FetchHll = DtFetch<Hll>;

pub type UpdateCounter = DtUpdate<CounterIncrement>;
pub type UpdateSet = DtUpdate<SetDelta>;
pub type UpdateGSet = DtUpdate<GSetAdditions>;
pub type UpdateMap = DtUpdate<MapOperation>;
pub type UpdateHll = DtUpdate<HllAdditions>;

/// A fetched value that passed the data type check.
///
/// `value` is `None` when the key does not exist.
pub struct Fetched {
    pub context: Option<Vec<u8>>,
    pub data_type: Option<WireDataType>,
    pub value: Option<pb::DtValue>,
}

/// Per data type rules for [`DtFetch`].
pub trait DataType: Send + Sync + 'static {
    type Value: Send + 'static;

    const FETCH_KIND: CommandKind;
    const DEFAULT_BUCKET_TYPE: &'static str;
    /// Includes the bucket type and, where it applies, `include_context`.
    const FETCH_OPTIONS: &'static [OptionSpec];
    /// Wire data types a fetch of this kind accepts.
    const ACCEPTS: &'static [WireDataType];

    fn decode_fetch(fetched: Fetched) -> Result<Self::Value, CommandError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchParams {
    pub r: Option<u32>,
    pub pr: Option<u32>,
    pub notfound_ok: Option<bool>,
    pub basic_quorum: Option<bool>,
    pub timeout: Option<u32>,
    pub include_context: Option<bool>,
}

pub struct DtFetch<T: DataType> {
    bucket_type: String,
    bucket: String,
    key: String,
    params: FetchParams,
    _type: PhantomData<fn() -> T>,
}

impl<T: DataType> DtFetch<T> {
    pub fn builder() -> DtFetchBuilder<T> {
        DtFetchBuilder::default()
    }

    pub fn bucket_type(&self) -> &str {
        &self.bucket_type
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl<T: DataType> std::fmt::Debug for DtFetch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DtFetch")
            .field("kind", &T::FETCH_KIND)
            .field("bucket_type", &self.bucket_type)
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("params", &self.params)
            .finish()
    }
}

impl<T: DataType> Operation for DtFetch<T> {
    type Request = pb::DtFetchReq;
    type Response = pb::DtFetchResp;
    type Output = T::Value;

    const KIND: CommandKind = T::FETCH_KIND;
    const OPTIONS: &'static [OptionSpec] = T::FETCH_OPTIONS;

    fn construct_request(&self) -> pb::DtFetchReq {
        pb::DtFetchReq {
            bucket: Some(self.bucket.as_bytes().to_vec()),
            key: Some(self.key.as_bytes().to_vec()),
            bucket_type: Some(self.bucket_type.as_bytes().to_vec()),
            r: self.params.r,
            pr: self.params.pr,
            basic_quorum: self.params.basic_quorum,
            notfound_ok: self.params.notfound_ok,
            timeout: self.params.timeout,
            sloppy_quorum: None,
            n_val: None,
            include_context: self.params.include_context,
        }
    }

    fn decode_success(&self, response: pb::DtFetchResp) -> Result<T::Value, CommandError> {
        let data_type = response.data_type.map(|raw| {
            WireDataType::try_from(raw)
                .map_err(|_| CommandError::decode(format!("unknown data type {raw}")))
        });
        let data_type = data_type.transpose()?;

        if response.value.is_some() {
            match data_type {
                Some(t) if T::ACCEPTS.contains(&t) => {}
                Some(t) => {
                    return Err(CommandError::decode(format!(
                        "{} on a {} value",
                        T::FETCH_KIND,
                        t.as_str_name()
                    )));
                }
                None => return Err(CommandError::decode("value without a data type")),
            }
        }

        T::decode_fetch(Fetched {
            context: response.context,
            data_type,
            value: response.value,
        })
    }
}

pub struct DtFetchBuilder<T: DataType> {
    bucket_type: Option<String>,
    bucket: Option<String>,
    key: Option<String>,
    params: FetchParams,
    core: BuilderCore<T::Value>,
}

impl<T: DataType> Default for DtFetchBuilder<T> {
    fn default() -> Self {
        Self {
            bucket_type: None,
            bucket: None,
            key: None,
            params: FetchParams::default(),
            core: BuilderCore::default(),
        }
    }
}

impl<T: DataType> DtFetchBuilder<T> {
    pub fn with_bucket_type(mut self, bucket_type: impl Into<String>) -> Self {
        self.bucket_type = Some(bucket_type.into());
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_r(mut self, r: u32) -> Self {
        self.params.r = Some(r);
        self
    }

    pub fn with_pr(mut self, pr: u32) -> Self {
        self.params.pr = Some(pr);
        self
    }

    pub fn with_notfound_ok(mut self, notfound_ok: bool) -> Self {
        self.params.notfound_ok = Some(notfound_ok);
        self
    }

    pub fn with_use_basic_quorum(mut self, basic_quorum: bool) -> Self {
        self.params.basic_quorum = Some(basic_quorum);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.params.timeout = Some(timeout_ms);
        self
    }
}

impl<T: DataType> CommandBuilder for DtFetchBuilder<T> {
    type Operation = DtFetch<T>;

    fn core_mut(&mut self) -> &mut BuilderCore<T::Value> {
        &mut self.core
    }

    fn build(mut self) -> Result<Command<DtFetch<T>>, ValidationError> {
        let callback = self.core.take_callback()?;
        let bucket_type = validate::optional_non_empty("bucket_type", self.bucket_type)?
            .unwrap_or_else(|| T::DEFAULT_BUCKET_TYPE.to_string());
        let mut params = self.params;
        params.timeout = validate::positive_timeout(params.timeout)?;
        let op = DtFetch {
            bucket_type,
            bucket: validate::require_non_empty("bucket", self.bucket)?,
            key: validate::require_non_empty("key", self.key)?,
            params,
            _type: PhantomData,
        };
        Ok(self.core.finish(callback, op))
    }
}

/// Per data type rules for [`DtUpdate`]: the payload is the operation itself.
pub trait UpdatePayload: Sized + Send + Sync + 'static {
    /// What the builder accumulates before validation.
    type Draft: Default + Send;
    type Output: Send + 'static;

    const KIND: CommandKind;
    const DEFAULT_BUCKET_TYPE: &'static str;
    const OPTIONS: &'static [OptionSpec];

    fn from_draft(draft: Self::Draft) -> Result<Self, ValidationError>;

    fn to_op(&self) -> pb::DtOp;

    fn decode_update(
        generated_key: Option<String>,
        response: pb::DtUpdateResp,
    ) -> Result<Self::Output, CommandError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateParams {
    pub w: Option<u32>,
    pub dw: Option<u32>,
    pub pw: Option<u32>,
    pub return_body: bool,
    pub timeout: Option<u32>,
    pub context: Option<Vec<u8>>,
}

impl Default for UpdateParams {
    fn default() -> Self {
        Self {
            w: None,
            dw: None,
            pw: None,
            return_body: true,
            timeout: None,
            context: None,
        }
    }
}

#[derive(Debug)]
pub struct DtUpdate<P: UpdatePayload> {
    bucket_type: String,
    bucket: String,
    key: Option<String>,
    params: UpdateParams,
    payload: P,
}

impl<P: UpdatePayload> DtUpdate<P> {
    pub fn builder() -> DtUpdateBuilder<P> {
        DtUpdateBuilder::default()
    }

    pub fn bucket_type(&self) -> &str {
        &self.bucket_type
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `None` lets the server generate one.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }
}

impl<P: UpdatePayload> Operation for DtUpdate<P> {
    type Request = pb::DtUpdateReq;
    type Response = pb::DtUpdateResp;
    type Output = P::Output;

    const KIND: CommandKind = P::KIND;
    const OPTIONS: &'static [OptionSpec] = P::OPTIONS;

    fn construct_request(&self) -> pb::DtUpdateReq {
        pb::DtUpdateReq {
            bucket: Some(self.bucket.as_bytes().to_vec()),
            key: self.key.as_ref().map(|k| k.as_bytes().to_vec()),
            bucket_type: Some(self.bucket_type.as_bytes().to_vec()),
            context: self.params.context.clone(),
            op: Some(self.payload.to_op()),
            w: self.params.w,
            dw: self.params.dw,
            pw: self.params.pw,
            return_body: Some(self.params.return_body),
            timeout: self.params.timeout,
            sloppy_quorum: None,
            n_val: None,
            include_context: None,
        }
    }

    fn decode_success(&self, mut response: pb::DtUpdateResp) -> Result<P::Output, CommandError> {
        let key = response.key.take();
        let generated_key = match (&self.key, key) {
            (None, Some(key)) => Some(utf8_lossy(&key)),
            _ => None,
        };
        P::decode_update(generated_key, response)
    }
}

pub struct DtUpdateBuilder<P: UpdatePayload> {
    bucket_type: Option<String>,
    bucket: Option<String>,
    key: Option<String>,
    w: Option<u32>,
    dw: Option<u32>,
    pw: Option<u32>,
    return_body: Option<bool>,
    timeout: Option<u32>,
    context: Option<Vec<u8>>,
    draft: P::Draft,
    core: BuilderCore<P::Output>,
}

impl<P: UpdatePayload> Default for DtUpdateBuilder<P> {
    fn default() -> Self {
        Self {
            bucket_type: None,
            bucket: None,
            key: None,
            w: None,
            dw: None,
            pw: None,
            return_body: None,
            timeout: None,
            context: None,
            draft: P::Draft::default(),
            core: BuilderCore::default(),
        }
    }
}

impl<P: UpdatePayload> DtUpdateBuilder<P> {
    pub fn with_bucket_type(mut self, bucket_type: impl Into<String>) -> Self {
        self.bucket_type = Some(bucket_type.into());
        self
    }

    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_w(mut self, w: u32) -> Self {
        self.w = Some(w);
        self
    }

    pub fn with_dw(mut self, dw: u32) -> Self {
        self.dw = Some(dw);
        self
    }

    pub fn with_pw(mut self, pw: u32) -> Self {
        self.pw = Some(pw);
        self
    }

    pub fn with_return_body(mut self, return_body: bool) -> Self {
        self.return_body = Some(return_body);
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }
}

impl<P: UpdatePayload> CommandBuilder for DtUpdateBuilder<P> {
    type Operation = DtUpdate<P>;

    fn core_mut(&mut self) -> &mut BuilderCore<P::Output> {
        &mut self.core
    }

    fn build(mut self) -> Result<Command<DtUpdate<P>>, ValidationError> {
        let callback = self.core.take_callback()?;
        let bucket_type = validate::optional_non_empty("bucket_type", self.bucket_type)?
            .unwrap_or_else(|| P::DEFAULT_BUCKET_TYPE.to_string());
        let bucket = validate::require_non_empty("bucket", self.bucket)?;
        let key = validate::optional_non_empty("key", self.key)?;
        let payload = P::from_draft(self.draft)?;
        let params = UpdateParams {
            w: self.w,
            dw: self.dw,
            pw: self.pw,
            return_body: self.return_body.unwrap_or(true),
            timeout: validate::positive_timeout(self.timeout)?,
            context: self.context,
        };
        let op = DtUpdate {
            bucket_type,
            bucket,
            key,
            params,
            payload,
        };
        Ok(self.core.finish(callback, op))
    }
}

/// Keys and map field names are text on every client this store ships with.
fn utf8_lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
