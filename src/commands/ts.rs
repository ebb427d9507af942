use std::str::FromStr;

use crate::{
    command::{BuilderCore, Command, CommandBuilder, CommandError, CommandKind, Operation},
    pb,
    validate::{self, OptionSpec, ValidationError},
};

/// One column value of a time-series primary key.
#[derive(Debug, Clone, PartialEq)]
pub enum TsCell {
    Varchar(Vec<u8>),
    Sint64(i64),
    Timestamp(i64),
    Boolean(bool),
    Double(f64),
}

impl TsCell {
    pub fn varchar(value: impl Into<Vec<u8>>) -> Self {
        Self::Varchar(value.into())
    }

    fn to_pb(&self) -> pb::TsCell {
        let mut cell = pb::TsCell::default();
        match self {
            Self::Varchar(v) => cell.varchar_value = Some(v.clone()),
            Self::Sint64(v) => cell.sint64_value = Some(*v),
            Self::Timestamp(v) => cell.timestamp_value = Some(*v),
            Self::Boolean(v) => cell.boolean_value = Some(*v),
            Self::Double(v) => cell.double_value = Some(*v),
        }
        cell
    }
}

/// Parses `s:<text>`, `i:<int>`, `t:<millis>`, `b:<bool>` or `d:<float>`.
impl FromStr for TsCell {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ValidationError::invalid("key", reason);
        let (tag, value) = s
            .split_once(':')
            .ok_or_else(|| invalid(format!("expected <type>:<value>, got {s:?}")))?;
        match tag {
            "s" => Ok(Self::varchar(value)),
            "i" => value
                .parse()
                .map(Self::Sint64)
                .map_err(|e| invalid(format!("{value:?}: {e}"))),
            "t" => value
                .parse()
                .map(Self::Timestamp)
                .map_err(|e| invalid(format!("{value:?}: {e}"))),
            "b" => value
                .parse()
                .map(Self::Boolean)
                .map_err(|e| invalid(format!("{value:?}: {e}"))),
            "d" => value
                .parse()
                .map(Self::Double)
                .map_err(|e| invalid(format!("{value:?}: {e}"))),
            other => Err(invalid(format!("unknown cell type {other:?}"))),
        }
    }
}

/// Deletes one row of a time-series table by its full primary key.
///
/// Deleting is idempotent: the node acknowledges with an empty response
/// whether or not the row existed, and the result is always `true`.
#[derive(Debug, Clone, PartialEq)]
pub struct TsDelete {
    table: String,
    key: Vec<TsCell>,
    timeout: Option<u32>,
}

impl TsDelete {
    pub fn builder() -> TsDeleteBuilder {
        TsDeleteBuilder::default()
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn key(&self) -> &[TsCell] {
        &self.key
    }
}

impl Operation for TsDelete {
    type Request = pb::TsDelReq;
    type Response = pb::TsDelResp;
    type Output = bool;

    const KIND: CommandKind = CommandKind::TsDelete;
    const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::required("table"),
        OptionSpec::required("key"),
        OptionSpec::optional("timeout"),
    ];

    fn construct_request(&self) -> pb::TsDelReq {
        pb::TsDelReq {
            table: Some(self.table.as_bytes().to_vec()),
            key: self.key.iter().map(TsCell::to_pb).collect(),
            vclock: None,
            timeout: self.timeout,
        }
    }

    fn decode_success(&self, _response: pb::TsDelResp) -> Result<bool, CommandError> {
        Ok(true)
    }
}

#[derive(Default)]
pub struct TsDeleteBuilder {
    table: Option<String>,
    key: Vec<TsCell>,
    timeout: Option<u32>,
    core: BuilderCore<bool>,
}

impl TsDeleteBuilder {
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_key(mut self, key: impl IntoIterator<Item = TsCell>) -> Self {
        self.key = key.into_iter().collect();
        self
    }

    /// Server-side timeout in milliseconds.
    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }
}

impl CommandBuilder for TsDeleteBuilder {
    type Operation = TsDelete;

    fn core_mut(&mut self) -> &mut BuilderCore<bool> {
        &mut self.core
    }

    fn build(mut self) -> Result<Command<TsDelete>, ValidationError> {
        let callback = self.core.take_callback()?;
        let op = TsDelete {
            table: validate::require_non_empty("table", self.table)?,
            key: validate::non_empty_list("key", self.key)?,
            timeout: validate::positive_timeout(self.timeout)?,
        };
        Ok(self.core.finish(callback, op))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use prost::Message as _;

    use super::*;
    use crate::{pb::MessageCode, transport::WireResponse, validate::ValidationErrorKind};

    fn noop(_: Result<bool, CommandError>) {}

    #[test]
    fn encode_carries_table_and_key_cells_only() {
        let cmd = TsDelete::builder()
            .with_table("GeoCheckin")
            .with_key([
                TsCell::varchar("hash1"),
                TsCell::varchar("user2"),
                TsCell::Timestamp(1_420_113_600_000),
            ])
            .with_callback(noop)
            .build()
            .unwrap();

        let req = cmd.encode();
        assert_eq!(req.kind, CommandKind::TsDelete);
        assert_eq!(req.code, MessageCode::TsDelReq);

        let decoded = pb::TsDelReq::decode(req.payload.as_ref()).unwrap();
        assert_eq!(decoded.table(), b"GeoCheckin");
        assert_eq!(decoded.key.len(), 3);
        assert_eq!(decoded.key[0].varchar_value(), b"hash1");
        assert_eq!(decoded.key[2].timestamp_value, Some(1_420_113_600_000));
        assert_eq!(decoded.key[2].varchar_value, None);
        assert_eq!(decoded.timeout, None);
        assert_eq!(decoded.vclock, None);
    }

    #[test]
    fn empty_response_means_deleted() {
        let cmd = TsDelete::builder()
            .with_table("t")
            .with_key([TsCell::Sint64(1)])
            .with_callback(noop)
            .build()
            .unwrap();
        let resp = WireResponse::new(MessageCode::TsDelResp, Vec::new());
        assert!(cmd.operation().interpret(&resp).unwrap());
    }

    #[test]
    fn build_requires_table_key_and_callback() {
        let err = TsDelete::builder()
            .with_key([TsCell::Sint64(1)])
            .with_callback(noop)
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::missing("table"));

        let err = TsDelete::builder()
            .with_table("t")
            .with_callback(noop)
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::empty("key"));

        let err = TsDelete::builder()
            .with_table("t")
            .with_key([TsCell::Sint64(1)])
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::missing("callback"));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = TsDelete::builder()
            .with_table("t")
            .with_key([TsCell::Sint64(1)])
            .with_timeout(0)
            .with_callback(noop)
            .build()
            .unwrap_err();
        assert_eq!(err.field, "timeout");
    }

    #[test]
    fn cells_parse_from_tagged_text() {
        assert_eq!("s:abc".parse::<TsCell>().unwrap(), TsCell::varchar("abc"));
        assert_eq!("s:a:b".parse::<TsCell>().unwrap(), TsCell::varchar("a:b"));
        assert_eq!("i:-3".parse::<TsCell>().unwrap(), TsCell::Sint64(-3));
        assert_eq!("t:10".parse::<TsCell>().unwrap(), TsCell::Timestamp(10));
        assert_eq!("b:true".parse::<TsCell>().unwrap(), TsCell::Boolean(true));
        assert_eq!("d:1.5".parse::<TsCell>().unwrap(), TsCell::Double(1.5));

        let err = "x:1".parse::<TsCell>().unwrap_err();
        assert!(matches!(err.kind, ValidationErrorKind::Invalid { .. }));
        assert!("i:abc".parse::<TsCell>().is_err());
        assert!("nocolon".parse::<TsCell>().is_err());
    }
}
