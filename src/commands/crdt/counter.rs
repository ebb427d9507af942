use serde::Serialize;

use super::{DataType, DtUpdateBuilder, Fetched, UpdatePayload, WireDataType};
use crate::{
    command::{CommandError, CommandKind},
    pb,
    validate::{self, OptionSpec, ValidationError},
};

/// Marker for counter fetches.
pub enum Counter {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CounterValue {
    pub value: i64,
    pub is_not_found: bool,
}

impl DataType for Counter {
    type Value = CounterValue;

    const FETCH_KIND: CommandKind = CommandKind::FetchCounter;
    const DEFAULT_BUCKET_TYPE: &'static str = "counters";
    const FETCH_OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::defaulted("bucket_type", "counters"),
        OptionSpec::required("bucket"),
        OptionSpec::required("key"),
        OptionSpec::optional("r"),
        OptionSpec::optional("pr"),
        OptionSpec::optional("notfound_ok"),
        OptionSpec::optional("use_basic_quorum"),
        OptionSpec::optional("timeout"),
    ];
    const ACCEPTS: &'static [WireDataType] = &[WireDataType::Counter];

    fn decode_fetch(fetched: Fetched) -> Result<CounterValue, CommandError> {
        Ok(match fetched.value {
            Some(value) => CounterValue {
                value: value.counter_value(),
                is_not_found: false,
            },
            None => CounterValue {
                value: 0,
                is_not_found: true,
            },
        })
    }
}

/// Signed delta applied to a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterIncrement {
    pub increment: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_key: Option<String>,
    /// Present when the update asked for the resulting value.
    pub value: Option<i64>,
}

impl UpdatePayload for CounterIncrement {
    type Draft = Option<i64>;
    type Output = CounterUpdate;

    const KIND: CommandKind = CommandKind::UpdateCounter;
    const DEFAULT_BUCKET_TYPE: &'static str = "counters";
    const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::defaulted("bucket_type", "counters"),
        OptionSpec::required("bucket"),
        OptionSpec::required("increment"),
        OptionSpec::optional("key"),
        OptionSpec::optional("w"),
        OptionSpec::optional("dw"),
        OptionSpec::optional("pw"),
        OptionSpec::defaulted("return_body", "true"),
        OptionSpec::optional("timeout"),
    ];

    fn from_draft(draft: Option<i64>) -> Result<Self, ValidationError> {
        let increment = validate::require("increment", draft)?;
        Ok(Self { increment })
    }

    fn to_op(&self) -> pb::DtOp {
        pb::DtOp {
            counter_op: Some(pb::CounterOp {
                increment: Some(self.increment),
            }),
            ..Default::default()
        }
    }

    fn decode_update(
        generated_key: Option<String>,
        response: pb::DtUpdateResp,
    ) -> Result<CounterUpdate, CommandError> {
        Ok(CounterUpdate {
            generated_key,
            value: response.counter_value,
        })
    }
}

impl DtUpdateBuilder<CounterIncrement> {
    /// Negative values decrement.
    pub fn with_increment(mut self, increment: i64) -> Self {
        self.draft = Some(increment);
        self
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use prost::Message as _;

    use super::*;
    use crate::{
        command::{CommandBuilder, Operation as _},
        commands::{FetchCounter, UpdateCounter},
        pb::MessageCode,
        transport::WireResponse,
    };

    #[test]
    fn fetch_decodes_value_and_not_found() {
        let cmd = FetchCounter::builder()
            .with_bucket("b")
            .with_key("k")
            .with_callback(|_| {})
            .build()
            .unwrap();

        let mut resp = pb::DtFetchResp {
            value: Some(pb::DtValue {
                counter_value: Some(-4),
                ..Default::default()
            }),
            ..Default::default()
        };
        resp.set_data_type(WireDataType::Counter);
        let out = cmd
            .operation()
            .interpret(&WireResponse::encode(MessageCode::DtFetchResp, &resp))
            .unwrap();
        assert_eq!(
            out,
            CounterValue {
                value: -4,
                is_not_found: false
            }
        );

        let mut missing = pb::DtFetchResp::default();
        missing.set_data_type(WireDataType::Counter);
        let out = cmd
            .operation()
            .interpret(&WireResponse::encode(MessageCode::DtFetchResp, &missing))
            .unwrap();
        assert!(out.is_not_found);
        assert_eq!(out.value, 0);
    }

    #[test]
    fn update_encodes_increment_and_defaults_to_no_retries() {
        let cmd = UpdateCounter::builder()
            .with_bucket("b")
            .with_key("k")
            .with_increment(-2)
            .with_callback(|_| {})
            .build()
            .unwrap();
        assert_eq!(cmd.remaining_retries(), 0);

        let req = cmd.encode();
        assert_eq!(req.code, MessageCode::DtUpdateReq);
        let decoded = pb::DtUpdateReq::decode(req.payload.as_ref()).unwrap();
        assert_eq!(decoded.bucket_type(), b"counters");
        assert_eq!(
            decoded.op.and_then(|op| op.counter_op),
            Some(pb::CounterOp {
                increment: Some(-2)
            })
        );
    }

    #[test]
    fn update_requires_increment() {
        let err = UpdateCounter::builder()
            .with_bucket("b")
            .with_callback(|_| {})
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::missing("increment"));
    }
}
