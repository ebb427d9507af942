use serde::Serialize;

use super::{DataType, DtUpdateBuilder, Fetched, UpdatePayload, WireDataType};
use crate::{
    command::{CommandError, CommandKind},
    pb,
    validate::{self, OptionSpec, ValidationError},
};

/// Marker for HyperLogLog fetches.
pub enum Hll {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HllValue {
    /// Estimated number of distinct elements added.
    pub cardinality: u64,
    pub is_not_found: bool,
}

impl DataType for Hll {
    type Value = HllValue;

    const FETCH_KIND: CommandKind = CommandKind::FetchHll;
    const DEFAULT_BUCKET_TYPE: &'static str = "hlls";
    const FETCH_OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::defaulted("bucket_type", "hlls"),
        OptionSpec::required("bucket"),
        OptionSpec::required("key"),
        OptionSpec::optional("r"),
        OptionSpec::optional("pr"),
        OptionSpec::optional("notfound_ok"),
        OptionSpec::optional("use_basic_quorum"),
        OptionSpec::optional("timeout"),
    ];
    const ACCEPTS: &'static [WireDataType] = &[WireDataType::Hll];

    fn decode_fetch(fetched: Fetched) -> Result<HllValue, CommandError> {
        Ok(HllValue {
            cardinality: fetched
                .value
                .as_ref()
                .map(|v| v.hll_value())
                .unwrap_or(0),
            is_not_found: fetched.value.is_none(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HllAdditions {
    pub additions: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HllUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_key: Option<String>,
    pub cardinality: Option<u64>,
}

impl UpdatePayload for HllAdditions {
    type Draft = Vec<Vec<u8>>;
    type Output = HllUpdate;

    const KIND: CommandKind = CommandKind::UpdateHll;
    const DEFAULT_BUCKET_TYPE: &'static str = "hlls";
    const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::defaulted("bucket_type", "hlls"),
        OptionSpec::required("bucket"),
        OptionSpec::required("additions"),
        OptionSpec::optional("key"),
        OptionSpec::optional("w"),
        OptionSpec::optional("dw"),
        OptionSpec::optional("pw"),
        OptionSpec::defaulted("return_body", "true"),
        OptionSpec::optional("timeout"),
    ];

    fn from_draft(draft: Vec<Vec<u8>>) -> Result<Self, ValidationError> {
        Ok(Self {
            additions: validate::non_empty_list("additions", draft)?,
        })
    }

    fn to_op(&self) -> pb::DtOp {
        pb::DtOp {
            hll_op: Some(pb::HllOp {
                adds: self.additions.clone(),
            }),
            ..Default::default()
        }
    }

    fn decode_update(
        generated_key: Option<String>,
        response: pb::DtUpdateResp,
    ) -> Result<HllUpdate, CommandError> {
        Ok(HllUpdate {
            generated_key,
            cardinality: response.hll_value,
        })
    }
}

impl DtUpdateBuilder<HllAdditions> {
    pub fn with_additions<I, V>(mut self, additions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        self.draft = additions.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        command::{CommandBuilder, Operation as _},
        commands::FetchHll,
        pb::MessageCode,
        transport::WireResponse,
    };

    #[test]
    fn fetch_reads_cardinality() {
        let cmd = FetchHll::builder()
            .with_bucket("b")
            .with_key("k")
            .with_callback(|_| {})
            .build()
            .unwrap();

        let mut resp = pb::DtFetchResp {
            value: Some(pb::DtValue {
                hll_value: Some(42),
                ..Default::default()
            }),
            ..Default::default()
        };
        resp.set_data_type(WireDataType::Hll);
        let out = cmd
            .operation()
            .interpret(&WireResponse::encode(MessageCode::DtFetchResp, &resp))
            .unwrap();
        assert_eq!(
            out,
            HllValue {
                cardinality: 42,
                is_not_found: false
            }
        );

        let out = cmd
            .operation()
            .interpret(&WireResponse::encode(
                MessageCode::DtFetchResp,
                &pb::DtFetchResp::default(),
            ))
            .unwrap();
        assert!(out.is_not_found);
        assert_eq!(out.cardinality, 0);
    }
}
