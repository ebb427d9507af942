use serde::Serialize;

use super::{DataType, DtFetchBuilder, DtUpdateBuilder, Fetched, UpdatePayload, WireDataType};
use crate::{
    command::{CommandError, CommandKind},
    pb, render,
    validate::{self, OptionSpec, ValidationError},
};

/// Marker for set fetches. Grow-only sets are read through the same kind.
pub enum Set {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetValue {
    #[serde(serialize_with = "render::bytes_list")]
    pub values: Vec<Vec<u8>>,
    #[serde(serialize_with = "render::opt_bytes", skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<u8>>,
    pub is_not_found: bool,
}

impl DataType for Set {
    type Value = SetValue;

    const FETCH_KIND: CommandKind = CommandKind::FetchSet;
    const DEFAULT_BUCKET_TYPE: &'static str = "sets";
    const FETCH_OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::defaulted("bucket_type", "sets"),
        OptionSpec::required("bucket"),
        OptionSpec::required("key"),
        OptionSpec::optional("r"),
        OptionSpec::optional("pr"),
        OptionSpec::optional("notfound_ok"),
        OptionSpec::optional("use_basic_quorum"),
        OptionSpec::optional("timeout"),
        OptionSpec::defaulted("include_context", "true"),
    ];
    const ACCEPTS: &'static [WireDataType] = &[WireDataType::Set, WireDataType::Gset];

    fn decode_fetch(fetched: Fetched) -> Result<SetValue, CommandError> {
        let Some(value) = fetched.value else {
            return Ok(SetValue {
                values: Vec::new(),
                context: fetched.context,
                is_not_found: true,
            });
        };
        let values = if fetched.data_type == Some(WireDataType::Gset) {
            value.gset_value
        } else {
            value.set_value
        };
        Ok(SetValue {
            values,
            context: fetched.context,
            is_not_found: false,
        })
    }
}

impl DtFetchBuilder<Set> {
    /// Asks the server for the causal context needed by later removals.
    pub fn with_include_context(mut self, include_context: bool) -> Self {
        self.params.include_context = Some(include_context);
        self
    }
}

/// Elements to add to and remove from a set in one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetDelta {
    pub additions: Vec<Vec<u8>>,
    pub removals: Vec<Vec<u8>>,
}

impl SetDelta {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.removals.is_empty()
    }

    pub(super) fn to_pb(&self) -> pb::SetOp {
        pb::SetOp {
            adds: self.additions.clone(),
            removes: self.removals.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SetUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_key: Option<String>,
    #[serde(serialize_with = "render::opt_bytes", skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<u8>>,
    #[serde(serialize_with = "render::bytes_list")]
    pub values: Vec<Vec<u8>>,
}

impl UpdatePayload for SetDelta {
    type Draft = SetDelta;
    type Output = SetUpdate;

    const KIND: CommandKind = CommandKind::UpdateSet;
    const DEFAULT_BUCKET_TYPE: &'static str = "sets";
    const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::defaulted("bucket_type", "sets"),
        OptionSpec::required("bucket"),
        OptionSpec::optional("additions"),
        OptionSpec::optional("removals"),
        OptionSpec::optional("key"),
        OptionSpec::optional("context"),
        OptionSpec::optional("w"),
        OptionSpec::optional("dw"),
        OptionSpec::optional("pw"),
        OptionSpec::defaulted("return_body", "true"),
        OptionSpec::optional("timeout"),
    ];

    fn from_draft(draft: SetDelta) -> Result<Self, ValidationError> {
        if draft.is_empty() {
            return Err(ValidationError::invalid(
                "additions",
                "at least one addition or removal is required",
            ));
        }
        Ok(draft)
    }

    fn to_op(&self) -> pb::DtOp {
        pb::DtOp {
            set_op: Some(self.to_pb()),
            ..Default::default()
        }
    }

    fn decode_update(
        generated_key: Option<String>,
        response: pb::DtUpdateResp,
    ) -> Result<SetUpdate, CommandError> {
        Ok(SetUpdate {
            generated_key,
            context: response.context,
            values: response.set_value,
        })
    }
}

impl DtUpdateBuilder<SetDelta> {
    pub fn with_additions<I, V>(mut self, additions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        self.draft.additions = additions.into_iter().map(Into::into).collect();
        self
    }

    /// Removals need the context from an earlier fetch.
    pub fn with_removals<I, V>(mut self, removals: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        self.draft.removals = removals.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, context: impl Into<Vec<u8>>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Elements to add to a grow-only set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GSetAdditions {
    pub additions: Vec<Vec<u8>>,
}

impl UpdatePayload for GSetAdditions {
    type Draft = Vec<Vec<u8>>;
    type Output = SetUpdate;

    const KIND: CommandKind = CommandKind::UpdateGSet;
    const DEFAULT_BUCKET_TYPE: &'static str = "gsets";
    const OPTIONS: &'static [OptionSpec] = &[
        OptionSpec::defaulted("bucket_type", "gsets"),
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
            gset_op: Some(pb::GSetOp {
                adds: self.additions.clone(),
            }),
            ..Default::default()
        }
    }

    fn decode_update(
        generated_key: Option<String>,
        response: pb::DtUpdateResp,
    ) -> Result<SetUpdate, CommandError> {
        Ok(SetUpdate {
            generated_key,
            context: None,
            values: response.gset_value,
        })
    }
}

impl DtUpdateBuilder<GSetAdditions> {
    pub fn with_additions<I, V>(mut self, additions: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Vec<u8>>,
    {
        self.draft = additions.into_iter().map(Into::into).collect();
        self
    }
}
